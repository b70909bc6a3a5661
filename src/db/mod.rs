//! Persistence module split across logical submodules. Every query helper
//! takes a plain `&Connection`; a `rusqlite::Transaction` derefs to one, so
//! the engines compose several helpers into a single atomic unit.

pub mod attendance;
pub mod books;
pub mod borrowings;
mod connection;
pub mod people;
pub mod reservations;

pub use connection::{begin_write, ensure_schema, open, open_in_memory};

use rusqlite::{ffi, Error as SqlError};

/// True when `err` is a UNIQUE (or primary key) violation. When `target` is
/// given, the violated index must also mention it, e.g. `people.email`.
pub(crate) fn is_unique_violation(err: &SqlError, target: Option<&str>) -> bool {
    match err {
        SqlError::SqliteFailure(failure, message) => {
            let unique = failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || failure.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY;
            let on_target = match (target, message) {
                (Some(target), Some(message)) => message.contains(target),
                (Some(_), None) => false,
                (None, _) => true,
            };
            unique && on_target
        }
        _ => false,
    }
}
