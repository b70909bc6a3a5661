use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::LibraryError;
use crate::models::{NewPerson, Person, PersonStatus, PersonType};

use super::is_unique_violation;

const COLUMNS: &str =
    "id, library_id, name, email, person_type, status, membership_date, created_at";

/// Raised by [`insert_person`] when the randomly drawn library id is already
/// taken. The caller draws a new one and tries again.
#[derive(Debug, thiserror::Error)]
#[error("library id {0} is already assigned")]
pub struct LibraryIdTaken(pub String);

fn from_row(row: &Row<'_>) -> rusqlite::Result<Person> {
    Ok(Person {
        id: row.get(0)?,
        library_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        person_type: row.get(4)?,
        status: row.get(5)?,
        membership_date: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Insert a new ACTIVE person. `email` is expected to be normalized already.
pub fn insert_person(
    conn: &Connection,
    library_id: &str,
    person: &NewPerson,
    now: DateTime<Utc>,
) -> Result<Person> {
    let membership_date = (person.person_type == PersonType::Member).then_some(now);

    conn.execute(
        "INSERT INTO people (library_id, name, email, person_type, status, membership_date, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            library_id,
            person.name,
            person.email,
            person.person_type,
            PersonStatus::Active,
            membership_date,
            now
        ],
    )
    .map_err(|err| {
        if is_unique_violation(&err, Some("people.library_id")) {
            anyhow::Error::new(LibraryIdTaken(library_id.to_string()))
        } else {
            map_email_conflict(err, &person.email)
        }
    })?;

    Ok(Person {
        id: conn.last_insert_rowid(),
        library_id: library_id.to_string(),
        name: person.name.clone(),
        email: person.email.clone(),
        person_type: person.person_type,
        status: PersonStatus::Active,
        membership_date,
        created_at: now,
    })
}

/// Fetch a single person by primary key.
pub fn find_person(conn: &Connection, id: i64) -> Result<Option<Person>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM people WHERE id = ?1"),
        [id],
        from_row,
    )
    .optional()
    .context("failed to load person")
}

/// Fetch a person by normalized email.
pub fn find_person_by_email(conn: &Connection, email: &str) -> Result<Option<Person>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM people WHERE email = ?1"),
        [email],
        from_row,
    )
    .optional()
    .context("failed to load person by email")
}

/// Fetch a person by the id printed on their card.
pub fn find_person_by_library_id(conn: &Connection, library_id: &str) -> Result<Option<Person>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM people WHERE library_id = ?1"),
        [library_id],
        from_row,
    )
    .optional()
    .context("failed to load person by library id")
}

/// Every person ordered by name, case-insensitively.
pub fn fetch_people(conn: &Connection) -> Result<Vec<Person>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {COLUMNS} FROM people ORDER BY name COLLATE NOCASE, id"
        ))
        .context("failed to prepare people query")?;

    let people = stmt
        .query_map([], from_row)
        .context("failed to load people")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect people")?;

    Ok(people)
}

/// Write the editable profile fields back. The caller decides the final
/// values, including whether the membership date gets stamped.
pub fn update_person_profile(conn: &Connection, person: &Person) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE people SET name = ?1, email = ?2, person_type = ?3, membership_date = ?4
             WHERE id = ?5",
            params![
                person.name,
                person.email,
                person.person_type,
                person.membership_date,
                person.id
            ],
        )
        .map_err(|err| map_email_conflict(err, &person.email))?;

    if updated == 0 {
        Err(anyhow!("Person not found"))
    } else {
        Ok(())
    }
}

/// Change the account status; errors when the person does not exist.
pub fn update_person_status(conn: &Connection, id: i64, status: PersonStatus) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE people SET status = ?1 WHERE id = ?2",
            params![status, id],
        )
        .context("failed to update person status")?;

    if updated == 0 {
        Err(anyhow!("Person not found"))
    } else {
        Ok(())
    }
}

/// Remove a person. Borrowing, reservation and attendance history cascades.
pub fn delete_person(conn: &Connection, id: i64) -> Result<()> {
    let deleted = conn
        .execute("DELETE FROM people WHERE id = ?1", params![id])
        .context("failed to delete person")?;

    if deleted == 0 {
        Err(anyhow!("Person not found"))
    } else {
        Ok(())
    }
}

fn map_email_conflict(err: rusqlite::Error, email: &str) -> anyhow::Error {
    if is_unique_violation(&err, Some("people.email")) {
        LibraryError::DuplicateEmail(email.to_string()).into()
    } else {
        anyhow::Error::new(err).context("failed to write person")
    }
}
