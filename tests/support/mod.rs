//! Shared fixtures: an on-disk database in a temp directory so several
//! threads can open their own connection to it.

use std::path::PathBuf;

use library_circulation::{Book, Config, Library, NewBook, NewPerson, Person, PersonType};
use tempfile::TempDir;

pub struct TestLibrary {
    // Keeps the directory alive for the duration of the test.
    _dir: TempDir,
    pub path: PathBuf,
}

impl TestLibrary {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("library.sqlite");
        let test_library = Self { _dir: dir, path };
        // Create the schema up front so concurrent openers do not race on it.
        test_library.open().close().expect("close library");
        test_library
    }

    pub fn config(&self) -> Config {
        Config::with_database(&self.path)
    }

    pub fn open(&self) -> Library {
        Library::open(self.config()).expect("open library")
    }
}

pub fn add_book(library: &Library, isbn: &str) -> Book {
    library
        .catalog()
        .add_book(NewBook {
            isbn: isbn.to_string(),
            title: format!("Title {isbn}"),
            author: "Author".to_string(),
        })
        .expect("add book")
}

pub fn register(library: &Library, email: &str) -> Person {
    library
        .people()
        .register(NewPerson {
            name: "Patron".to_string(),
            email: email.to_string(),
            person_type: PersonType::Member,
        })
        .expect("register person")
}
