use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::{Connection, Transaction, TransactionBehavior};

/// Open (creating if needed) the database at `path`, run lazy migrations and
/// return a live connection. Several connections may point at the same file;
/// WAL mode lets readers proceed while one writer holds the lock.
pub fn open(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context("failed to create data directory")?;
        }
    }

    let conn = Connection::open(path)
        .with_context(|| format!("failed to open SQLite database {}", path.display()))?;
    configure(&conn, busy_timeout)?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
        .context("failed to enable WAL journal")?;
    ensure_schema(&conn)?;
    Ok(conn)
}

/// Private in-memory database, used by unit tests and throwaway sessions.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    configure(&conn, Duration::from_millis(0))?;
    ensure_schema(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection, busy_timeout: Duration) -> Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])
        .context("failed to enable foreign keys")?;
    conn.busy_timeout(busy_timeout)
        .context("failed to set busy timeout")?;
    Ok(())
}

/// Begin a transaction that takes the write lock up front.
///
/// Every core operation reads state and then writes based on what it read.
/// Taking the lock before the first read means two concurrent requests can
/// never both see the same precondition: the second one waits (up to the busy
/// timeout) and then observes the first one's committed changes.
pub fn begin_write(conn: &Connection) -> Result<Transaction<'_>> {
    Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .context("failed to begin write transaction")
}

/// Create every table and index if missing. The partial unique indexes are
/// the database-level backstop for the "one active row per key" rules.
pub fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS people (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            library_id TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            person_type TEXT NOT NULL,
            status TEXT NOT NULL,
            membership_date TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )
    .context("failed to create people table")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS books (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            isbn TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            author TEXT NOT NULL,
            status TEXT NOT NULL
        )",
        [],
    )
    .context("failed to create books table")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS borrowings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            book_id INTEGER NOT NULL,
            person_id INTEGER NOT NULL,
            borrowed_at TEXT NOT NULL,
            due_date TEXT NOT NULL,
            return_date TEXT,
            status TEXT NOT NULL,
            FOREIGN KEY(book_id) REFERENCES books(id) ON DELETE CASCADE,
            FOREIGN KEY(person_id) REFERENCES people(id) ON DELETE CASCADE
        )",
        [],
    )
    .context("failed to create borrowings table")?;

    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS borrowings_one_active_per_book
         ON borrowings (book_id) WHERE status = 'BORROWED'",
        [],
    )
    .context("failed to create active borrowing index")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS reservations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            book_id INTEGER NOT NULL,
            person_id INTEGER NOT NULL,
            reserved_at TEXT NOT NULL,
            status TEXT NOT NULL,
            FOREIGN KEY(book_id) REFERENCES books(id) ON DELETE CASCADE,
            FOREIGN KEY(person_id) REFERENCES people(id) ON DELETE CASCADE
        )",
        [],
    )
    .context("failed to create reservations table")?;

    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS reservations_one_waiting
         ON reservations (book_id, person_id) WHERE status = 'WAITING'",
        [],
    )
    .context("failed to create waiting reservation index")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            person_id INTEGER,
            visitor_name TEXT,
            visitor_email TEXT,
            check_in_time TEXT NOT NULL,
            check_out_time TEXT,
            FOREIGN KEY(person_id) REFERENCES people(id) ON DELETE CASCADE,
            CHECK (person_id IS NOT NULL OR visitor_email IS NOT NULL)
        )",
        [],
    )
    .context("failed to create attendance table")?;

    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS attendance_one_open_per_person
         ON attendance (person_id)
         WHERE check_out_time IS NULL AND person_id IS NOT NULL",
        [],
    )
    .context("failed to create open session index")?;

    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS attendance_one_open_per_visitor
         ON attendance (visitor_email)
         WHERE check_out_time IS NULL AND person_id IS NULL",
        [],
    )
    .context("failed to create open visitor session index")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creation_is_idempotent() {
        let conn = open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('people', 'books', 'borrowings', 'reservations', 'attendance')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 5);
    }

    #[test]
    fn open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("library.sqlite");
        let conn = open(&path, Duration::from_millis(100)).unwrap();
        drop(conn);
        assert!(path.exists());
    }
}
