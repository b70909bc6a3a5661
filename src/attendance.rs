//! Daily check-in / check-out at the front desk.
//!
//! A person (or anonymous visitor, keyed by email) has at most one open
//! session at a time. The lookup for "already checked in" and "checked in
//! today" uses the local calendar day; a session somebody forgot to close on
//! an earlier day is closed at the end of that day the next time they check
//! in, so it never blocks a fresh visit.

use anyhow::Context;
use chrono::{DateTime, Duration, Local, NaiveDateTime, NaiveTime, TimeZone, Utc};
use rusqlite::{Connection, Transaction};
use tracing::{info, warn};

use crate::db;
use crate::error::{LibraryError, Result};
use crate::models::{Attendance, Attendee};
use crate::registry::{normalize_email, require_active_person, require_person};

/// Quarter hours searched past midnight for the start of a local day.
const DAY_START_PROBES: i64 = 4 * 4;

/// Check-in and check-out against one connection.
pub struct AttendanceTracker<'conn> {
    conn: &'conn Connection,
}

impl<'conn> AttendanceTracker<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// [`Self::check_in_at`] with the current local time.
    pub fn check_in(&self, person_id: i64) -> Result<Attendance> {
        self.check_in_at(person_id, Local::now())
    }

    /// Open a session for an ACTIVE person unless one is already open today.
    pub fn check_in_at(&self, person_id: i64, now: DateTime<Local>) -> Result<Attendance> {
        let tx = db::begin_write(self.conn)?;
        require_active_person(&tx, person_id)?;
        open_session(tx, Attendee::Person(person_id), now)
    }

    /// [`Self::check_out_at`] with the current local time.
    pub fn check_out(&self, person_id: i64) -> Result<Attendance> {
        self.check_out_at(person_id, Local::now())
    }

    /// Close today's open session for a person.
    pub fn check_out_at(&self, person_id: i64, now: DateTime<Local>) -> Result<Attendance> {
        let tx = db::begin_write(self.conn)?;
        require_person(&tx, person_id)?;
        close_session(tx, Attendee::Person(person_id), now)
    }

    /// [`Self::check_in_visitor_at`] with the current local time.
    pub fn check_in_visitor(&self, name: &str, email: &str) -> Result<Attendance> {
        self.check_in_visitor_at(name, email, Local::now())
    }

    /// Walk-in without a registration. The email is the visitor's key for the
    /// matching check-out.
    pub fn check_in_visitor_at(
        &self,
        name: &str,
        email: &str,
        now: DateTime<Local>,
    ) -> Result<Attendance> {
        let attendee = Attendee::Visitor {
            name: name.trim().to_string(),
            email: normalize_email(email)?,
        };
        let tx = db::begin_write(self.conn)?;
        open_session(tx, attendee, now)
    }

    /// [`Self::check_out_visitor_at`] with the current local time.
    pub fn check_out_visitor(&self, email: &str) -> Result<Attendance> {
        self.check_out_visitor_at(email, Local::now())
    }

    /// Close today's open session for the visitor with this email.
    pub fn check_out_visitor_at(&self, email: &str, now: DateTime<Local>) -> Result<Attendance> {
        let attendee = Attendee::Visitor {
            name: String::new(),
            email: normalize_email(email)?,
        };
        let tx = db::begin_write(self.conn)?;
        close_session(tx, attendee, now)
    }

    /// Everyone currently checked in.
    pub fn present(&self) -> Result<Vec<Attendance>> {
        Ok(db::attendance::fetch_open_sessions(self.conn)?)
    }

    /// A person's sessions, most recent first.
    pub fn history(&self, person_id: i64) -> Result<Vec<Attendance>> {
        require_person(self.conn, person_id)?;
        Ok(db::attendance::fetch_history(
            self.conn,
            &Attendee::Person(person_id),
        )?)
    }
}

fn open_session(tx: Transaction<'_>, attendee: Attendee, now: DateTime<Local>) -> Result<Attendance> {
    let (day_start, day_end) = local_day_bounds(now);

    if db::attendance::find_open_attendance(&tx, &attendee, day_start, day_end)?.is_some() {
        return Err(LibraryError::AlreadyCheckedIn {
            subject: attendee.to_string(),
        });
    }

    for stale in db::attendance::fetch_stale_open(&tx, &attendee, day_start)? {
        let (_, stale_day_end) = local_day_bounds(stale.check_in_time.with_timezone(&Local));
        let closed_at = (stale_day_end - Duration::seconds(1)).max(stale.check_in_time);
        db::attendance::update_attendance_checkout(&tx, stale.id, closed_at)?;
        warn!(
            attendance_id = stale.id,
            %attendee,
            checked_in = %stale.check_in_time,
            "closing session left open on an earlier day"
        );
    }

    let session = db::attendance::insert_attendance(&tx, &attendee, now.with_timezone(&Utc))?;
    tx.commit().context("failed to commit check-in")?;
    info!(attendance_id = session.id, %attendee, "checked in");
    Ok(session)
}

fn close_session(tx: Transaction<'_>, attendee: Attendee, now: DateTime<Local>) -> Result<Attendance> {
    let (day_start, day_end) = local_day_bounds(now);

    let mut session = db::attendance::find_open_attendance(&tx, &attendee, day_start, day_end)?
        .ok_or_else(|| LibraryError::NoOpenSession {
            subject: attendee.to_string(),
        })?;

    let check_out_time = now.with_timezone(&Utc);
    db::attendance::update_attendance_checkout(&tx, session.id, check_out_time)?;
    tx.commit().context("failed to commit check-out")?;

    session.check_out_time = Some(check_out_time);
    info!(attendance_id = session.id, %attendee, "checked out");
    Ok(session)
}

/// `[midnight, next midnight)` of the local day containing `now`, in UTC.
pub fn local_day_bounds(now: DateTime<Local>) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = now.date_naive();
    let tomorrow = today.succ_opt().unwrap_or(today);
    (
        local_midnight(today.and_time(NaiveTime::MIN)),
        local_midnight(tomorrow.and_time(NaiveTime::MIN)),
    )
}

fn local_midnight(naive: NaiveDateTime) -> DateTime<Utc> {
    first_valid_instant(naive, |candidate| {
        Local
            .from_local_datetime(&candidate)
            .earliest()
            .map(|time| time.with_timezone(&Utc))
    })
}

/// A DST jump can skip midnight entirely. The day then starts at the first
/// local wall-clock time that exists, probed in quarter-hour steps.
fn first_valid_instant<F>(naive: NaiveDateTime, resolve: F) -> DateTime<Utc>
where
    F: Fn(NaiveDateTime) -> Option<DateTime<Utc>>,
{
    (0..=DAY_START_PROBES)
        .map(|step| naive + Duration::minutes(15 * step))
        .find_map(&resolve)
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}
