use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::LibraryError;
use crate::models::{BookStatus, Borrowing, BorrowingStatus};

use super::is_unique_violation;

const COLUMNS: &str = "id, book_id, person_id, borrowed_at, due_date, return_date, status";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Borrowing> {
    Ok(Borrowing {
        id: row.get(0)?,
        book_id: row.get(1)?,
        person_id: row.get(2)?,
        borrowed_at: row.get(3)?,
        due_date: row.get(4)?,
        return_date: row.get(5)?,
        status: row.get(6)?,
    })
}

/// Record a new active loan. The `borrowings_one_active_per_book` index turns
/// a second concurrent loan of the same book into `BookUnavailable`.
pub fn insert_borrowing(
    conn: &Connection,
    book_id: i64,
    person_id: i64,
    borrowed_at: DateTime<Utc>,
    due_date: DateTime<Utc>,
) -> Result<Borrowing> {
    conn.execute(
        "INSERT INTO borrowings (book_id, person_id, borrowed_at, due_date, return_date, status)
         VALUES (?1, ?2, ?3, ?4, NULL, ?5)",
        params![
            book_id,
            person_id,
            borrowed_at,
            due_date,
            BorrowingStatus::Borrowed
        ],
    )
    .map_err(|err| {
        if is_unique_violation(&err, Some("borrowings.book_id")) {
            LibraryError::BookUnavailable {
                book_id,
                status: BookStatus::Borrowed,
            }
            .into()
        } else {
            anyhow::Error::new(err).context("failed to insert borrowing")
        }
    })?;

    Ok(Borrowing {
        id: conn.last_insert_rowid(),
        book_id,
        person_id,
        borrowed_at,
        due_date,
        return_date: None,
        status: BorrowingStatus::Borrowed,
    })
}

/// Fetch a single borrowing by primary key.
pub fn find_borrowing(conn: &Connection, id: i64) -> Result<Option<Borrowing>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM borrowings WHERE id = ?1"),
        [id],
        from_row,
    )
    .optional()
    .context("failed to load borrowing")
}

/// Close an active loan. Only touches rows still BORROWED, so a concurrent
/// double return updates nothing the second time.
pub fn mark_returned(conn: &Connection, id: i64, returned_at: DateTime<Utc>) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE borrowings SET status = ?1, return_date = ?2
             WHERE id = ?3 AND status = ?4",
            params![
                BorrowingStatus::Returned,
                returned_at,
                id,
                BorrowingStatus::Borrowed
            ],
        )
        .context("failed to update borrowing status")?;

    if updated == 0 {
        Err(anyhow!("Borrowing not active"))
    } else {
        Ok(())
    }
}

/// Books `person_id` holds right now, checked against the borrowing cap.
pub fn count_active_borrowings(conn: &Connection, person_id: i64) -> Result<u32> {
    conn.query_row(
        "SELECT COUNT(*) FROM borrowings WHERE person_id = ?1 AND status = ?2",
        params![person_id, BorrowingStatus::Borrowed],
        |row| row.get(0),
    )
    .context("failed to count active borrowings")
}

/// Whether `person_id` currently holds `book_id`.
pub fn has_active_borrowing(conn: &Connection, book_id: i64, person_id: i64) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS (
             SELECT 1 FROM borrowings WHERE book_id = ?1 AND person_id = ?2 AND status = ?3
         )",
        params![book_id, person_id, BorrowingStatus::Borrowed],
        |row| row.get(0),
    )
    .context("failed to check for an active borrowing")
}

/// Active loans of `book_id`; more than one means the catalog is corrupt.
pub fn count_active_for_book(conn: &Connection, book_id: i64) -> Result<u32> {
    conn.query_row(
        "SELECT COUNT(*) FROM borrowings WHERE book_id = ?1 AND status = ?2",
        params![book_id, BorrowingStatus::Borrowed],
        |row| row.get(0),
    )
    .context("failed to count active borrowings for book")
}

/// Open loans of one person, soonest due first.
pub fn fetch_active_borrowings(conn: &Connection, person_id: i64) -> Result<Vec<Borrowing>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {COLUMNS} FROM borrowings
             WHERE person_id = ?1 AND status = ?2
             ORDER BY due_date, id"
        ))
        .context("failed to prepare active borrowings query")?;

    let borrowings = stmt
        .query_map(params![person_id, BorrowingStatus::Borrowed], from_row)
        .context("failed to load active borrowings")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect active borrowings")?;

    Ok(borrowings)
}

/// Full loan history of a book, oldest first.
pub fn fetch_borrowings_for_book(conn: &Connection, book_id: i64) -> Result<Vec<Borrowing>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {COLUMNS} FROM borrowings WHERE book_id = ?1 ORDER BY borrowed_at, id"
        ))
        .context("failed to prepare book borrowings query")?;

    let borrowings = stmt
        .query_map([book_id], from_row)
        .context("failed to load book borrowings")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect book borrowings")?;

    Ok(borrowings)
}

/// Remove a borrowing row. Callers make sure it is already returned.
pub fn delete_borrowing(conn: &Connection, id: i64) -> Result<()> {
    let deleted = conn
        .execute("DELETE FROM borrowings WHERE id = ?1", params![id])
        .context("failed to delete borrowing")?;

    if deleted == 0 {
        Err(anyhow!("Borrowing not found"))
    } else {
        Ok(())
    }
}
