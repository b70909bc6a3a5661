//! Command-line front end over the core components.
//!
//! Every subcommand maps to one core operation and prints the resulting
//! record. The binary opens the database once, runs one command and closes it.

use std::path::PathBuf;

use anyhow::Result;
use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};

use crate::library_id::{self, IdentifierGenerator};
use crate::models::{NewBook, NewPerson, PersonStatus, PersonType, PersonUpdate};
use crate::Library;

/// Library circulation and attendance desk
#[derive(Parser, Debug)]
#[command(name = "library-circulation")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// SQLite database to use instead of LIBRARY_DB_PATH / the home default
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the database and schema if missing
    Init,

    /// Manage registered people
    #[command(subcommand)]
    Person(PersonCommand),

    /// Manage the book catalog
    #[command(subcommand)]
    Book(BookCommand),

    /// Lend a book
    Borrow {
        book_id: i64,
        person_id: i64,
        /// Due date (YYYY-MM-DD); defaults to the configured loan period
        #[arg(long)]
        due: Option<NaiveDate>,
    },

    /// Return a borrowed book
    Return { borrowing_id: i64 },

    /// Join the waiting list for a book
    Reserve { book_id: i64, person_id: i64 },

    /// Withdraw a waiting reservation
    CancelReservation { reservation_id: i64 },

    /// Lend a reserved book to the head of its queue
    FulfillReservation {
        reservation_id: i64,
        #[arg(long)]
        due: Option<NaiveDate>,
    },

    /// Check a registered person in
    CheckIn { person_id: i64 },

    /// Check a registered person out
    CheckOut { person_id: i64 },

    /// Walk-in visitors without a registration
    #[command(subcommand)]
    Visitor(VisitorCommand),

    /// List everyone currently checked in
    Present,

    /// Report books whose status disagrees with their borrowings
    Audit,

    /// Work with library ids
    #[command(subcommand)]
    Id(IdCommand),
}

#[derive(Subcommand, Debug)]
pub enum PersonCommand {
    Register {
        name: String,
        email: String,
        #[arg(long = "type", default_value = "MEMBER")]
        person_type: PersonType,
    },
    Show {
        person_id: i64,
    },
    List,
    Update {
        person_id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long = "type")]
        person_type: Option<PersonType>,
    },
    Status {
        person_id: i64,
        status: PersonStatus,
    },
    Delete {
        person_id: i64,
    },
    /// Books the person currently holds
    Loans {
        person_id: i64,
    },
}

#[derive(Subcommand, Debug)]
pub enum BookCommand {
    Add {
        isbn: String,
        title: String,
        #[arg(long, default_value = "")]
        author: String,
    },
    Show {
        book_id: i64,
    },
    List,
    Delete {
        book_id: i64,
    },
    /// Waiting reservations in service order
    Queue {
        book_id: i64,
    },
}

#[derive(Subcommand, Debug)]
pub enum VisitorCommand {
    CheckIn { name: String, email: String },
    CheckOut { email: String },
}

#[derive(Subcommand, Debug)]
pub enum IdCommand {
    Validate {
        id: String,
    },
    Generate {
        #[arg(long = "type", default_value = "MEMBER")]
        person_type: PersonType,
    },
}

/// Loans are due at the end of the given day.
fn due_date(library: &Library, due: Option<NaiveDate>) -> chrono::DateTime<chrono::Utc> {
    match due {
        Some(date) => date
            .and_time(NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN))
            .and_utc(),
        None => library.circulation().default_due_date(),
    }
}

/// Run one command against an open library.
pub fn execute(library: &Library, command: Command) -> Result<()> {
    match command {
        Command::Init => {
            println!(
                "database ready at {}",
                library.config().database_path.display()
            );
        }
        Command::Person(command) => execute_person(library, command)?,
        Command::Book(command) => execute_book(library, command)?,
        Command::Borrow {
            book_id,
            person_id,
            due,
        } => {
            let due = due_date(library, due);
            println!("{}", library.circulation().borrow(book_id, person_id, due)?);
        }
        Command::Return { borrowing_id } => {
            println!("{}", library.circulation().return_book(borrowing_id)?);
        }
        Command::Reserve { book_id, person_id } => {
            println!("{}", library.circulation().reserve(book_id, person_id)?);
        }
        Command::CancelReservation { reservation_id } => {
            println!(
                "{}",
                library.circulation().cancel_reservation(reservation_id)?
            );
        }
        Command::FulfillReservation {
            reservation_id,
            due,
        } => {
            let due = due_date(library, due);
            let fulfilment = library
                .circulation()
                .fulfill_reservation(reservation_id, due)?;
            println!("{}", fulfilment.reservation);
            println!("{}", fulfilment.borrowing);
        }
        Command::CheckIn { person_id } => {
            println!("{}", library.attendance().check_in(person_id)?);
        }
        Command::CheckOut { person_id } => {
            println!("{}", library.attendance().check_out(person_id)?);
        }
        Command::Visitor(VisitorCommand::CheckIn { name, email }) => {
            println!("{}", library.attendance().check_in_visitor(&name, &email)?);
        }
        Command::Visitor(VisitorCommand::CheckOut { email }) => {
            println!("{}", library.attendance().check_out_visitor(&email)?);
        }
        Command::Present => {
            for session in library.attendance().present()? {
                println!("{session}");
            }
        }
        Command::Audit => {
            let violations = library.circulation().consistency_violations()?;
            if violations.is_empty() {
                println!("all book statuses are consistent");
            }
            for entry in violations {
                println!(
                    "{}: {} active borrowing(s), {} waiting reservation(s)",
                    entry.book, entry.active_borrowings, entry.waiting_reservations
                );
            }
        }
        Command::Id(IdCommand::Validate { id }) => match library_id::parse(&id) {
            Some(parsed) => {
                let year = parsed
                    .year
                    .map(|year| year.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{id}: valid {} id, year {year}, sequence {}",
                    parsed.person_type, parsed.sequence
                );
            }
            None => println!("{id}: not a valid library id"),
        },
        Command::Id(IdCommand::Generate { person_type }) => {
            println!("{}", IdentifierGenerator::new().generate(person_type));
        }
    }
    Ok(())
}

fn execute_person(library: &Library, command: PersonCommand) -> Result<()> {
    match command {
        PersonCommand::Register {
            name,
            email,
            person_type,
        } => {
            let person = library.people().register(NewPerson {
                name,
                email,
                person_type,
            })?;
            println!("{person}");
        }
        PersonCommand::Show { person_id } => println!("{}", library.people().find(person_id)?),
        PersonCommand::List => {
            for person in library.people().list()? {
                println!("{person}");
            }
        }
        PersonCommand::Update {
            person_id,
            name,
            email,
            person_type,
        } => {
            let update = PersonUpdate {
                name,
                email,
                person_type,
            };
            println!("{}", library.people().update_profile(person_id, update)?);
        }
        PersonCommand::Status { person_id, status } => {
            println!("{}", library.people().set_status(person_id, status)?);
        }
        PersonCommand::Delete { person_id } => {
            library.circulation().delete_person(person_id)?;
            println!("person {person_id} deleted");
        }
        PersonCommand::Loans { person_id } => {
            for borrowing in library.circulation().active_borrowings(person_id)? {
                println!("{borrowing}");
            }
        }
    }
    Ok(())
}

fn execute_book(library: &Library, command: BookCommand) -> Result<()> {
    match command {
        BookCommand::Add {
            isbn,
            title,
            author,
        } => {
            let book = library.catalog().add_book(NewBook {
                isbn,
                title,
                author,
            })?;
            println!("{book}");
        }
        BookCommand::Show { book_id } => println!("{}", library.catalog().find(book_id)?),
        BookCommand::List => {
            for book in library.catalog().list()? {
                println!("{book}");
            }
        }
        BookCommand::Delete { book_id } => {
            library.circulation().delete_book(book_id)?;
            println!("book {book_id} deleted");
        }
        BookCommand::Queue { book_id } => {
            for reservation in library.circulation().reservation_queue(book_id)? {
                println!("{reservation}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_subcommands() {
        let cli = Cli::try_parse_from([
            "library-circulation",
            "--db",
            "/tmp/lib.sqlite",
            "person",
            "register",
            "Ada",
            "ada@example.org",
            "--type",
            "vip",
        ])
        .unwrap();

        assert_eq!(cli.db, Some(PathBuf::from("/tmp/lib.sqlite")));
        assert!(matches!(
            cli.command,
            Command::Person(PersonCommand::Register {
                person_type: PersonType::Vip,
                ..
            })
        ));
    }

    #[test]
    fn due_dates_parse_as_calendar_days() {
        let cli = Cli::try_parse_from(["library-circulation", "borrow", "1", "2", "--due", "2026-11-01"])
            .unwrap();
        match cli.command {
            Command::Borrow { due, .. } => {
                assert_eq!(due, NaiveDate::from_ymd_opt(2026, 11, 1));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
