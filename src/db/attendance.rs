use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::LibraryError;
use crate::models::{Attendance, Attendee};

use super::is_unique_violation;

const COLUMNS: &str =
    "id, person_id, visitor_name, visitor_email, check_in_time, check_out_time";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Attendance> {
    let person_id: Option<i64> = row.get(1)?;
    let attendee = match person_id {
        Some(id) => Attendee::Person(id),
        None => Attendee::Visitor {
            name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            email: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        },
    };

    Ok(Attendance {
        id: row.get(0)?,
        attendee,
        check_in_time: row.get(4)?,
        check_out_time: row.get(5)?,
    })
}

/// WHERE fragment selecting the rows that belong to `attendee`, bound to `?1`.
/// Anonymous visitors are keyed by email and never match a registered person.
fn attendee_filter(attendee: &Attendee) -> (&'static str, Value) {
    match attendee {
        Attendee::Person(id) => ("person_id = ?1", Value::Integer(*id)),
        Attendee::Visitor { email, .. } => (
            "person_id IS NULL AND visitor_email = ?1",
            Value::Text(email.clone()),
        ),
    }
}

/// Open a session. The partial unique indexes on open rows turn a second
/// concurrent check-in into `AlreadyCheckedIn`.
pub fn insert_attendance(
    conn: &Connection,
    attendee: &Attendee,
    check_in_time: DateTime<Utc>,
) -> Result<Attendance> {
    let (person_id, visitor_name, visitor_email) = match attendee {
        Attendee::Person(id) => (Some(*id), None, None),
        Attendee::Visitor { name, email } => (None, Some(name.as_str()), Some(email.as_str())),
    };

    conn.execute(
        "INSERT INTO attendance (person_id, visitor_name, visitor_email, check_in_time, check_out_time)
         VALUES (?1, ?2, ?3, ?4, NULL)",
        params![person_id, visitor_name, visitor_email, check_in_time],
    )
    .map_err(|err| {
        if is_unique_violation(&err, Some("attendance.")) {
            LibraryError::AlreadyCheckedIn {
                subject: attendee.to_string(),
            }
            .into()
        } else {
            anyhow::Error::new(err).context("failed to insert attendance")
        }
    })?;

    Ok(Attendance {
        id: conn.last_insert_rowid(),
        attendee: attendee.clone(),
        check_in_time,
        check_out_time: None,
    })
}

/// The open session whose check-in falls inside `[from, until)`.
pub fn find_open_attendance(
    conn: &Connection,
    attendee: &Attendee,
    from: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Option<Attendance>> {
    let (filter, key) = attendee_filter(attendee);
    conn.query_row(
        &format!(
            "SELECT {COLUMNS} FROM attendance
             WHERE {filter} AND check_out_time IS NULL
               AND check_in_time >= ?2 AND check_in_time < ?3
             ORDER BY check_in_time DESC LIMIT 1"
        ),
        params![key, from, until],
        from_row,
    )
    .optional()
    .context("failed to look up open attendance")
}

/// Open sessions that started before `before`, i.e. never closed on a
/// previous day.
pub fn fetch_stale_open(
    conn: &Connection,
    attendee: &Attendee,
    before: DateTime<Utc>,
) -> Result<Vec<Attendance>> {
    let (filter, key) = attendee_filter(attendee);
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {COLUMNS} FROM attendance
             WHERE {filter} AND check_out_time IS NULL AND check_in_time < ?2
             ORDER BY check_in_time"
        ))
        .context("failed to prepare stale session query")?;

    let sessions = stmt
        .query_map(params![key, before], from_row)
        .context("failed to load stale sessions")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect stale sessions")?;

    Ok(sessions)
}

/// Close an open session. Rows that are already closed are left alone.
pub fn update_attendance_checkout(
    conn: &Connection,
    id: i64,
    check_out_time: DateTime<Utc>,
) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE attendance SET check_out_time = ?1
             WHERE id = ?2 AND check_out_time IS NULL",
            params![check_out_time, id],
        )
        .context("failed to record check-out")?;

    if updated == 0 {
        Err(anyhow!("Attendance already closed"))
    } else {
        Ok(())
    }
}

/// Everyone currently in the building, earliest arrival first.
pub fn fetch_open_sessions(conn: &Connection) -> Result<Vec<Attendance>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {COLUMNS} FROM attendance
             WHERE check_out_time IS NULL
             ORDER BY check_in_time, id"
        ))
        .context("failed to prepare open sessions query")?;

    let sessions = stmt
        .query_map([], from_row)
        .context("failed to load open sessions")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect open sessions")?;

    Ok(sessions)
}

/// All sessions of one attendee, most recent check-in first.
pub fn fetch_history(conn: &Connection, attendee: &Attendee) -> Result<Vec<Attendance>> {
    let (filter, key) = attendee_filter(attendee);
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {COLUMNS} FROM attendance WHERE {filter}
             ORDER BY check_in_time DESC, id DESC"
        ))
        .context("failed to prepare attendance history query")?;

    let sessions = stmt
        .query_map([key], from_row)
        .context("failed to load attendance history")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect attendance history")?;

    Ok(sessions)
}
