//! Library circulation and front-desk attendance.
//!
//! People, books, borrowings, reservations and attendance rows live in an
//! embedded SQLite database. The engines in this crate keep them consistent:
//! a book's status always matches its borrowings and reservations, nobody
//! exceeds the borrowing cap, and nobody is checked in twice at once. Every
//! operation that reads state and then writes runs as one write transaction,
//! so concurrent requests against the same database file cannot both win.
pub mod attendance;
pub mod catalog;
pub mod circulation;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod library;
pub mod library_id;
pub mod models;
pub mod registry;

/// The entry point most callers need: open once, then use the components.
pub use library::Library;
pub use config::Config;

/// The core components.
pub use attendance::AttendanceTracker;
pub use catalog::CatalogStore;
pub use circulation::{CirculationEngine, Fulfillment};
pub use library_id::IdentifierGenerator;
pub use registry::PersonStore;

pub use error::{ErrorKind, LibraryError, Result};
pub use models::{
    Attendance, Attendee, Book, BookStatus, Borrowing, BorrowingStatus, NewBook, NewPerson, Person,
    PersonStatus, PersonType, PersonUpdate, Reservation, ReservationStatus,
};
