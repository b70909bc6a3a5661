//! People: members, visitors, students, VIPs and staff share one table and one
//! lifecycle. Registration is where library ids are handed out.

use anyhow::Context;
use chrono::Utc;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::db;
use crate::db::people::LibraryIdTaken;
use crate::error::{Entity, LibraryError, Result};
use crate::library_id::IdentifierGenerator;
use crate::models::{NewPerson, Person, PersonStatus, PersonType, PersonUpdate};

pub struct PersonStore<'conn> {
    conn: &'conn Connection,
    generator: IdentifierGenerator,
    identifier_attempts: u32,
}

impl<'conn> PersonStore<'conn> {
    pub fn new(conn: &'conn Connection, identifier_attempts: u32) -> Self {
        Self {
            conn,
            generator: IdentifierGenerator::new(),
            identifier_attempts: identifier_attempts.max(1),
        }
    }

    /// Swap the random source, e.g. for a seeded generator in tests.
    pub fn with_generator(mut self, generator: IdentifierGenerator) -> Self {
        self.generator = generator;
        self
    }

    /// Register a new ACTIVE person and assign their library id.
    ///
    /// The id is drawn inside the same transaction as the insert. When the
    /// unique index reports a collision a fresh id is drawn, up to the
    /// configured number of attempts, after which registration fails with
    /// `IdentifierExhausted` and nothing is written.
    pub fn register(&mut self, person: NewPerson) -> Result<Person> {
        let person = NewPerson {
            name: validate_name(&person.name)?,
            email: normalize_email(&person.email)?,
            person_type: person.person_type,
        };

        let tx = db::begin_write(self.conn)?;
        if db::people::find_person_by_email(&tx, &person.email)?.is_some() {
            return Err(LibraryError::DuplicateEmail(person.email));
        }

        let now = Utc::now();
        for attempt in 1..=self.identifier_attempts {
            let library_id = self.generator.generate(person.person_type);
            match db::people::insert_person(&tx, &library_id, &person, now) {
                Ok(created) => {
                    tx.commit().context("failed to commit registration")?;
                    info!(
                        person_id = created.id,
                        library_id = %created.library_id,
                        person_type = %created.person_type,
                        "person registered"
                    );
                    return Ok(created);
                }
                Err(err) if err.downcast_ref::<LibraryIdTaken>().is_some() => {
                    debug!(attempt, %library_id, "library id collision, drawing again");
                }
                Err(err) => return Err(err.into()),
            }
        }

        warn!(
            person_type = %person.person_type,
            attempts = self.identifier_attempts,
            "gave up allocating a library id"
        );
        Err(LibraryError::IdentifierExhausted {
            person_type: person.person_type,
            attempts: self.identifier_attempts,
        })
    }

    pub fn find(&self, id: i64) -> Result<Person> {
        require_person(self.conn, id)
    }

    /// Lookup by email, compared case-insensitively.
    pub fn find_by_email(&self, email: &str) -> Result<Person> {
        let email = email.trim().to_lowercase();
        db::people::find_person_by_email(self.conn, &email)?
            .ok_or_else(|| LibraryError::not_found(Entity::Person, email))
    }

    /// Lookup by the id printed on the library card.
    pub fn find_by_library_id(&self, library_id: &str) -> Result<Person> {
        let library_id = library_id.trim();
        db::people::find_person_by_library_id(self.conn, library_id)?
            .ok_or_else(|| LibraryError::not_found(Entity::Person, library_id))
    }

    pub fn list(&self) -> Result<Vec<Person>> {
        Ok(db::people::fetch_people(self.conn)?)
    }

    /// Apply a partial profile update. Becoming a MEMBER for the first time
    /// stamps the membership date; the library id is never reissued.
    pub fn update_profile(&self, id: i64, update: PersonUpdate) -> Result<Person> {
        let tx = db::begin_write(self.conn)?;
        let mut person = require_person(&tx, id)?;

        if let Some(name) = update.name {
            person.name = validate_name(&name)?;
        }
        if let Some(email) = update.email {
            person.email = normalize_email(&email)?;
        }
        if let Some(person_type) = update.person_type {
            person.person_type = person_type;
        }
        if person.person_type == PersonType::Member && person.membership_date.is_none() {
            person.membership_date = Some(Utc::now());
        }

        db::people::update_person_profile(&tx, &person)?;
        tx.commit().context("failed to commit profile update")?;
        info!(person_id = id, "person profile updated");
        Ok(person)
    }

    pub fn set_status(&self, id: i64, status: PersonStatus) -> Result<Person> {
        let tx = db::begin_write(self.conn)?;
        let mut person = require_person(&tx, id)?;
        db::people::update_person_status(&tx, id, status)?;
        tx.commit().context("failed to commit status change")?;

        info!(person_id = id, from = %person.status, to = %status, "person status changed");
        person.status = status;
        Ok(person)
    }
}

/// Load a person or fail with `NotFound`.
pub(crate) fn require_person(conn: &Connection, id: i64) -> Result<Person> {
    db::people::find_person(conn, id)?.ok_or_else(|| LibraryError::not_found(Entity::Person, id))
}

/// Load a person and insist they are ACTIVE.
pub(crate) fn require_active_person(conn: &Connection, id: i64) -> Result<Person> {
    let person = require_person(conn, id)?;
    if !person.is_active() {
        return Err(LibraryError::PersonInactive {
            person_id: id,
            status: person.status,
        });
    }
    Ok(person)
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LibraryError::InvalidInput("name must not be empty".into()));
    }
    Ok(name.to_string())
}

/// Trim and lower-case an email address, rejecting obviously broken ones.
pub(crate) fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(LibraryError::InvalidInput(format!(
            "`{email}` is not an email address"
        ))),
    }
}
