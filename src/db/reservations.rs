use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::LibraryError;
use crate::models::{Reservation, ReservationStatus};

use super::is_unique_violation;

const COLUMNS: &str = "id, book_id, person_id, reserved_at, status";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Reservation> {
    Ok(Reservation {
        id: row.get(0)?,
        book_id: row.get(1)?,
        person_id: row.get(2)?,
        reserved_at: row.get(3)?,
        status: row.get(4)?,
    })
}

/// Queue a WAITING reservation. The `reservations_one_waiting` index rejects a
/// second waiting row for the same (book, person).
pub fn insert_reservation(
    conn: &Connection,
    book_id: i64,
    person_id: i64,
    reserved_at: DateTime<Utc>,
) -> Result<Reservation> {
    conn.execute(
        "INSERT INTO reservations (book_id, person_id, reserved_at, status)
         VALUES (?1, ?2, ?3, ?4)",
        params![book_id, person_id, reserved_at, ReservationStatus::Waiting],
    )
    .map_err(|err| {
        if is_unique_violation(&err, Some("reservations.")) {
            LibraryError::DuplicateReservation { book_id, person_id }.into()
        } else {
            anyhow::Error::new(err).context("failed to insert reservation")
        }
    })?;

    Ok(Reservation {
        id: conn.last_insert_rowid(),
        book_id,
        person_id,
        reserved_at,
        status: ReservationStatus::Waiting,
    })
}

/// Fetch a single reservation by primary key.
pub fn find_reservation_by_id(conn: &Connection, id: i64) -> Result<Option<Reservation>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM reservations WHERE id = ?1"),
        [id],
        from_row,
    )
    .optional()
    .context("failed to load reservation")
}

/// Most recent reservation for (book, person) in the given status.
pub fn find_reservation(
    conn: &Connection,
    book_id: i64,
    person_id: i64,
    status: ReservationStatus,
) -> Result<Option<Reservation>> {
    conn.query_row(
        &format!(
            "SELECT {COLUMNS} FROM reservations
             WHERE book_id = ?1 AND person_id = ?2 AND status = ?3
             ORDER BY id DESC LIMIT 1"
        ),
        params![book_id, person_id, status],
        from_row,
    )
    .optional()
    .context("failed to look up reservation")
}

/// Move a reservation out of `from`. Returns an error when the row was not in
/// that status any more.
pub fn update_reservation_status(
    conn: &Connection,
    id: i64,
    from: ReservationStatus,
    to: ReservationStatus,
) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE reservations SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![to, id, from],
        )
        .context("failed to update reservation status")?;

    if updated == 0 {
        Err(anyhow!("Reservation not {from}"))
    } else {
        Ok(())
    }
}

/// WAITING reservations for a book, oldest first. The head of this list is
/// next in line.
pub fn fetch_waiting_for_book(conn: &Connection, book_id: i64) -> Result<Vec<Reservation>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {COLUMNS} FROM reservations
             WHERE book_id = ?1 AND status = ?2
             ORDER BY reserved_at, id"
        ))
        .context("failed to prepare reservation queue query")?;

    let reservations = stmt
        .query_map(params![book_id, ReservationStatus::Waiting], from_row)
        .context("failed to load reservation queue")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect reservation queue")?;

    Ok(reservations)
}

/// Length of the waiting queue for a book.
pub fn count_waiting_for_book(conn: &Connection, book_id: i64) -> Result<u32> {
    conn.query_row(
        "SELECT COUNT(*) FROM reservations WHERE book_id = ?1 AND status = ?2",
        params![book_id, ReservationStatus::Waiting],
        |row| row.get(0),
    )
    .context("failed to count waiting reservations for book")
}

/// Waiting reservations held by one person across all books.
pub fn count_waiting_for_person(conn: &Connection, person_id: i64) -> Result<u32> {
    conn.query_row(
        "SELECT COUNT(*) FROM reservations WHERE person_id = ?1 AND status = ?2",
        params![person_id, ReservationStatus::Waiting],
        |row| row.get(0),
    )
    .context("failed to count waiting reservations for person")
}
