use rusqlite::Connection;
use tracing::info;

use crate::attendance::AttendanceTracker;
use crate::catalog::CatalogStore;
use crate::circulation::CirculationEngine;
use crate::config::Config;
use crate::db;
use crate::error::Result;
use crate::registry::PersonStore;

/// One open database plus the settings the engines need.
///
/// Open it once at start-up and hand out the component views below; each of
/// them borrows the same connection. Call [`Library::close`] on shutdown so
/// a failed close is reported instead of being swallowed by `Drop`. Threads
/// that serve requests in parallel each open their own `Library` on the same
/// database file.
pub struct Library {
    conn: Connection,
    config: Config,
}

impl Library {
    /// Open (creating if needed) the database named by `config`.
    pub fn open(config: Config) -> Result<Self> {
        let conn = db::open(&config.database_path, config.busy_timeout)?;
        info!(path = %config.database_path.display(), "library database opened");
        Ok(Self { conn, config })
    }

    /// Throwaway database that lives as long as the value.
    pub fn open_in_memory(config: Config) -> Result<Self> {
        let conn = db::open_in_memory()?;
        Ok(Self { conn, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> CatalogStore<'_> {
        CatalogStore::new(&self.conn)
    }

    pub fn people(&self) -> PersonStore<'_> {
        PersonStore::new(&self.conn, self.config.identifier_attempts)
    }

    /// Borrowing rules use the configured cap and loan period.
    pub fn circulation(&self) -> CirculationEngine<'_> {
        CirculationEngine::new(
            &self.conn,
            self.config.borrowing_limit,
            self.config.loan_period,
        )
    }

    pub fn attendance(&self) -> AttendanceTracker<'_> {
        AttendanceTracker::new(&self.conn)
    }

    /// Close the connection, reporting any error SQLite returns.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, err)| err)?;
        info!(path = %self.config.database_path.display(), "library database closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Attendee, NewBook, NewPerson, PersonType};

    #[test]
    fn components_share_one_database() {
        let library = Library::open_in_memory(Config::with_database(":memory:")).unwrap();
        let book = library
            .catalog()
            .add_book(NewBook {
                isbn: "978-0".into(),
                title: "Dune".into(),
                author: "Herbert".into(),
            })
            .unwrap();
        let person = library
            .people()
            .register(NewPerson {
                name: "Paul".into(),
                email: "paul@example.org".into(),
                person_type: PersonType::Member,
            })
            .unwrap();

        let circulation = library.circulation();
        let borrowing = circulation
            .borrow(book.id, person.id, circulation.default_due_date())
            .unwrap();
        assert!(borrowing.due_date > borrowing.borrowed_at + chrono::Duration::days(13));

        let session = library.attendance().check_in(person.id).unwrap();
        assert_eq!(session.attendee, Attendee::Person(person.id));
        library.close().unwrap();
    }
}
