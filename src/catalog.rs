//! Book catalog. Owns book records and reports their availability; status
//! changes themselves are driven by [`crate::CirculationEngine`].

use rusqlite::Connection;
use tracing::info;

use crate::db;
use crate::error::{Entity, LibraryError, Result};
use crate::models::{Book, NewBook};

pub struct CatalogStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> CatalogStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Add a book. ISBNs are compared after trimming surrounding whitespace.
    pub fn add_book(&self, book: NewBook) -> Result<Book> {
        let book = NewBook {
            isbn: book.isbn.trim().to_string(),
            title: book.title.trim().to_string(),
            author: book.author.trim().to_string(),
        };
        if book.isbn.is_empty() {
            return Err(LibraryError::InvalidInput("ISBN must not be empty".into()));
        }
        if book.title.is_empty() {
            return Err(LibraryError::InvalidInput("title must not be empty".into()));
        }

        let book = db::books::insert_book(self.conn, &book)?;
        info!(book_id = book.id, isbn = %book.isbn, "book added to catalog");
        Ok(book)
    }

    pub fn find(&self, id: i64) -> Result<Book> {
        require_book(self.conn, id)
    }

    pub fn find_by_isbn(&self, isbn: &str) -> Result<Book> {
        let isbn = isbn.trim();
        db::books::find_book_by_isbn(self.conn, isbn)?
            .ok_or_else(|| LibraryError::not_found(Entity::Book, isbn))
    }

    pub fn list(&self) -> Result<Vec<Book>> {
        Ok(db::books::fetch_books(self.conn)?)
    }
}

/// Load a book or fail with `NotFound`.
pub(crate) fn require_book(conn: &Connection, id: i64) -> Result<Book> {
    db::books::find_book(conn, id)?.ok_or_else(|| LibraryError::not_found(Entity::Book, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::BookStatus;

    fn dune() -> NewBook {
        NewBook {
            isbn: " 978-0441013593 ".into(),
            title: "Dune".into(),
            author: "Frank Herbert".into(),
        }
    }

    #[test]
    fn new_books_are_available() {
        let conn = db::open_in_memory().unwrap();
        let catalog = CatalogStore::new(&conn);

        let book = catalog.add_book(dune()).unwrap();
        assert_eq!(book.status, BookStatus::Available);
        assert_eq!(catalog.find_by_isbn("978-0441013593").unwrap(), book);
    }

    #[test]
    fn isbn_must_be_unique() {
        let conn = db::open_in_memory().unwrap();
        let catalog = CatalogStore::new(&conn);
        catalog.add_book(dune()).unwrap();

        let err = catalog.add_book(dune()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateIsbn);
    }

    #[test]
    fn missing_books_are_not_found() {
        let conn = db::open_in_memory().unwrap();
        let err = CatalogStore::new(&conn).find(99).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
