//! Domain records that mirror the SQLite schema. They stay plain data holders;
//! the rules that tie them together live in the circulation and attendance
//! engines.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

/// Error returned when a stored or user-supplied status string is unknown.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} `{value}`")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

/// Status columns are stored as their upper-case names so the database stays
/// readable with the sqlite3 shell. This wires up `Display`, `FromStr` and the
/// rusqlite conversions for each of them.
macro_rules! text_enum {
    ($name:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(ParseEnumError {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|err| FromSqlError::Other(Box::new(err)))
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersonType {
    Member,
    Visitor,
    Student,
    Vip,
    Staff,
}

text_enum!(PersonType, "person type" {
    Member => "MEMBER",
    Visitor => "VISITOR",
    Student => "STUDENT",
    Vip => "VIP",
    Staff => "STAFF",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersonStatus {
    Active,
    Inactive,
    Suspended,
    Banned,
}

text_enum!(PersonStatus, "person status" {
    Active => "ACTIVE",
    Inactive => "INACTIVE",
    Suspended => "SUSPENDED",
    Banned => "BANNED",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookStatus {
    Available,
    Borrowed,
    Reserved,
}

text_enum!(BookStatus, "book status" {
    Available => "AVAILABLE",
    Borrowed => "BORROWED",
    Reserved => "RESERVED",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BorrowingStatus {
    Borrowed,
    Returned,
}

text_enum!(BorrowingStatus, "borrowing status" {
    Borrowed => "BORROWED",
    Returned => "RETURNED",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservationStatus {
    Waiting,
    Fulfilled,
    Cancelled,
}

text_enum!(ReservationStatus, "reservation status" {
    Waiting => "WAITING",
    Fulfilled => "FULFILLED",
    Cancelled => "CANCELLED",
});

/// A registered member, visitor, student, VIP or staff member.
#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub id: i64,
    /// Human-readable identifier printed on library cards, see
    /// [`crate::library_id`].
    pub library_id: String,
    pub name: String,
    /// Stored lower-cased; unique across all people.
    pub email: String,
    pub person_type: PersonType,
    pub status: PersonStatus,
    /// Set the first time the person becomes a MEMBER and never cleared.
    pub membership_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Person {
    pub fn is_active(&self) -> bool {
        self.status == PersonStatus::Active
    }
}

impl fmt::Display for Person {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} {} <{}> {} {}",
            self.id, self.library_id, self.name, self.email, self.person_type, self.status
        )
    }
}

/// Input for [`crate::PersonStore::register`].
#[derive(Debug, Clone)]
pub struct NewPerson {
    pub name: String,
    pub email: String,
    pub person_type: PersonType,
}

/// Partial profile update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct PersonUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub person_type: Option<PersonType>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub id: i64,
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub status: BookStatus,
}

impl fmt::Display for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} [{}] {} by {} ({})",
            self.id, self.isbn, self.title, self.author, self.status
        )
    }
}

#[derive(Debug, Clone)]
pub struct NewBook {
    pub isbn: String,
    pub title: String,
    pub author: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Borrowing {
    pub id: i64,
    pub book_id: i64,
    pub person_id: i64,
    pub borrowed_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: BorrowingStatus,
}

impl Borrowing {
    pub fn is_active(&self) -> bool {
        self.status == BorrowingStatus::Borrowed
    }
}

impl fmt::Display for Borrowing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "borrowing #{}: book {} -> person {}, due {}, {}",
            self.id,
            self.book_id,
            self.person_id,
            self.due_date.format("%Y-%m-%d"),
            self.status
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub id: i64,
    pub book_id: i64,
    pub person_id: i64,
    pub reserved_at: DateTime<Utc>,
    pub status: ReservationStatus,
}

impl fmt::Display for Reservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "reservation #{}: book {} for person {}, {}",
            self.id, self.book_id, self.person_id, self.status
        )
    }
}

/// Who an attendance row belongs to: a registered person, or an anonymous
/// walk-in identified only by the details they gave at the desk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attendee {
    Person(i64),
    Visitor { name: String, email: String },
}

impl fmt::Display for Attendee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attendee::Person(id) => write!(f, "person {id}"),
            Attendee::Visitor { email, .. } => write!(f, "visitor {email}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attendance {
    pub id: i64,
    pub attendee: Attendee,
    pub check_in_time: DateTime<Utc>,
    /// `None` while the session is open.
    pub check_out_time: Option<DateTime<Utc>>,
}

impl Attendance {
    pub fn is_open(&self) -> bool {
        self.check_out_time.is_none()
    }
}

impl fmt::Display for Attendance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let check_out = self
            .check_out_time
            .map(|time| time.to_rfc3339())
            .unwrap_or_else(|| "open".to_string());
        write!(
            f,
            "attendance #{}: {} in {} out {}",
            self.id,
            self.attendee,
            self.check_in_time.to_rfc3339(),
            check_out
        )
    }
}
