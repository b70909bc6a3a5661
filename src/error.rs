//! Typed failures returned by every core operation.
//!
//! Persistence helpers in [`crate::db`] speak `anyhow` so they can attach
//! query context the same way everywhere. The engines convert those errors
//! back into [`LibraryError`] at the operation boundary: a business error that
//! was raised inside a helper (for example a unique index rejecting a second
//! open attendance row) comes back out as its own variant, everything else
//! becomes [`LibraryError::Persistence`].

use std::fmt;

use thiserror::Error;

use crate::models::{BookStatus, PersonStatus, PersonType, ReservationStatus};

pub type Result<T> = std::result::Result<T, LibraryError>;

/// The kind of record a [`LibraryError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Person,
    Book,
    Borrowing,
    Reservation,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Person => "person",
            Entity::Book => "book",
            Entity::Borrowing => "borrowing",
            Entity::Reservation => "reservation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("{entity} {key} not found")]
    NotFound { entity: Entity, key: String },

    #[error("person {person_id} is {status}, only ACTIVE people may do this")]
    PersonInactive {
        person_id: i64,
        status: PersonStatus,
    },

    #[error("book {book_id} is {status} and cannot be lent")]
    BookUnavailable { book_id: i64, status: BookStatus },

    #[error("person {person_id} already holds {limit} borrowed books")]
    LimitExceeded { person_id: i64, limit: u32 },

    #[error("person {person_id} already has a waiting reservation for book {book_id}")]
    DuplicateReservation { book_id: i64, person_id: i64 },

    #[error("person {person_id} is currently borrowing book {book_id}")]
    AlreadyBorrowing { book_id: i64, person_id: i64 },

    #[error("borrowing {borrowing_id} has already been returned")]
    AlreadyReturned { borrowing_id: i64 },

    #[error("{subject} is already checked in today")]
    AlreadyCheckedIn { subject: String },

    #[error("{subject} has no open check-in today")]
    NoOpenSession { subject: String },

    #[error("reservation {reservation_id} is {status}, not WAITING")]
    ReservationClosed {
        reservation_id: i64,
        status: ReservationStatus,
    },

    #[error("{0}")]
    PreconditionFailed(String),

    #[error("email {0} is already registered")]
    DuplicateEmail(String),

    #[error("a book with ISBN {0} already exists")]
    DuplicateIsbn(String),

    #[error("could not allocate a unique {person_type} library id after {attempts} attempts")]
    IdentifierExhausted {
        person_type: PersonType,
        attempts: u32,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("persistence failure: {0:#}")]
    Persistence(anyhow::Error),
}

/// Stable, machine-readable error codes. The HTTP layer (or the CLI) keys its
/// responses off these rather than the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    PersonInactive,
    BookUnavailable,
    LimitExceeded,
    DuplicateReservation,
    AlreadyBorrowing,
    AlreadyReturned,
    AlreadyCheckedIn,
    NoOpenSession,
    ReservationClosed,
    PreconditionFailed,
    DuplicateEmail,
    DuplicateIsbn,
    IdentifierExhausted,
    InvalidInput,
    PersistenceFailure,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::PersonInactive => "PERSON_INACTIVE",
            ErrorKind::BookUnavailable => "BOOK_UNAVAILABLE",
            ErrorKind::LimitExceeded => "LIMIT_EXCEEDED",
            ErrorKind::DuplicateReservation => "DUPLICATE_RESERVATION",
            ErrorKind::AlreadyBorrowing => "ALREADY_BORROWING",
            ErrorKind::AlreadyReturned => "ALREADY_RETURNED",
            ErrorKind::AlreadyCheckedIn => "ALREADY_CHECKED_IN",
            ErrorKind::NoOpenSession => "NO_OPEN_SESSION",
            ErrorKind::ReservationClosed => "RESERVATION_CLOSED",
            ErrorKind::PreconditionFailed => "PRECONDITION_FAILED",
            ErrorKind::DuplicateEmail => "DUPLICATE_EMAIL",
            ErrorKind::DuplicateIsbn => "DUPLICATE_ISBN",
            ErrorKind::IdentifierExhausted => "IDENTIFIER_EXHAUSTED",
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::PersistenceFailure => "PERSISTENCE_FAILURE",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl LibraryError {
    pub(crate) fn not_found(entity: Entity, key: impl fmt::Display) -> Self {
        LibraryError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LibraryError::NotFound { .. } => ErrorKind::NotFound,
            LibraryError::PersonInactive { .. } => ErrorKind::PersonInactive,
            LibraryError::BookUnavailable { .. } => ErrorKind::BookUnavailable,
            LibraryError::LimitExceeded { .. } => ErrorKind::LimitExceeded,
            LibraryError::DuplicateReservation { .. } => ErrorKind::DuplicateReservation,
            LibraryError::AlreadyBorrowing { .. } => ErrorKind::AlreadyBorrowing,
            LibraryError::AlreadyReturned { .. } => ErrorKind::AlreadyReturned,
            LibraryError::AlreadyCheckedIn { .. } => ErrorKind::AlreadyCheckedIn,
            LibraryError::NoOpenSession { .. } => ErrorKind::NoOpenSession,
            LibraryError::ReservationClosed { .. } => ErrorKind::ReservationClosed,
            LibraryError::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            LibraryError::DuplicateEmail(_) => ErrorKind::DuplicateEmail,
            LibraryError::DuplicateIsbn(_) => ErrorKind::DuplicateIsbn,
            LibraryError::IdentifierExhausted { .. } => ErrorKind::IdentifierExhausted,
            LibraryError::InvalidInput(_) => ErrorKind::InvalidInput,
            LibraryError::Persistence(_) => ErrorKind::PersistenceFailure,
        }
    }

    /// Status code an HTTP front end should answer with.
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::BookUnavailable
            | ErrorKind::DuplicateReservation
            | ErrorKind::AlreadyBorrowing
            | ErrorKind::AlreadyReturned
            | ErrorKind::AlreadyCheckedIn
            | ErrorKind::ReservationClosed
            | ErrorKind::PreconditionFailed
            | ErrorKind::DuplicateEmail
            | ErrorKind::DuplicateIsbn => 409,
            ErrorKind::PersonInactive
            | ErrorKind::LimitExceeded
            | ErrorKind::NoOpenSession
            | ErrorKind::InvalidInput => 400,
            ErrorKind::IdentifierExhausted | ErrorKind::PersistenceFailure => 500,
        }
    }

    /// Business-rule failures are final for the request. Only a storage
    /// failure (lock timeout, I/O) may succeed when tried again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LibraryError::Persistence(_))
    }
}

impl From<anyhow::Error> for LibraryError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<LibraryError>() {
            Ok(err) => err,
            Err(err) => LibraryError::Persistence(err),
        }
    }
}

impl From<rusqlite::Error> for LibraryError {
    fn from(err: rusqlite::Error) -> Self {
        LibraryError::Persistence(err.into())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::*;

    #[test]
    fn business_errors_survive_an_anyhow_round_trip() {
        let wrapped = Err::<(), _>(anyhow::Error::new(LibraryError::AlreadyCheckedIn {
            subject: "person 7".into(),
        }))
        .context("failed to insert attendance")
        .unwrap_err();

        let err = LibraryError::from(wrapped);
        assert_eq!(err.kind(), ErrorKind::AlreadyCheckedIn);
        assert_eq!(err.http_status(), 409);
        assert!(!err.is_retryable());
    }

    #[test]
    fn foreign_errors_become_persistence_failures() {
        let err = LibraryError::from(anyhow::anyhow!("disk I/O error"));
        assert_eq!(err.kind(), ErrorKind::PersistenceFailure);
        assert_eq!(err.http_status(), 500);
        assert!(err.is_retryable());
    }

    #[test]
    fn not_found_maps_to_404() {
        let err = LibraryError::not_found(Entity::Book, 12);
        assert_eq!(err.to_string(), "book 12 not found");
        assert_eq!(err.http_status(), 404);
        assert_eq!(err.kind().code(), "NOT_FOUND");
    }
}
