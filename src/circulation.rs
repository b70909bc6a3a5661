//! Borrowing, returning and reserving books.
//!
//! A book's status must always agree with its circulation rows: BORROWED
//! exactly when one borrowing of it is active, RESERVED only while nobody has
//! it and someone is waiting. Each operation below reads the rows it depends
//! on and writes every affected record inside one write transaction
//! ([`db::begin_write`]), so a concurrent request either sees the whole
//! change or none of it. The loser of a race gets the same business error it
//! would have received had it arrived later.
//!
//! Returning a book does not look at the reservation queue: the book goes
//! back to AVAILABLE even when reservations are waiting. The next holder is
//! served through [`CirculationEngine::fulfill_reservation`].

use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::info;

use crate::catalog::require_book;
use crate::db;
use crate::db::books::BookCirculation;
use crate::error::{Entity, LibraryError, Result};
use crate::models::{Book, BookStatus, Borrowing, BorrowingStatus, Reservation, ReservationStatus};
use crate::registry::{require_active_person, require_person};

/// Lending rules applied to one connection.
pub struct CirculationEngine<'conn> {
    conn: &'conn Connection,
    borrowing_limit: u32,
    loan_period: chrono::Duration,
}

/// Outcome of [`CirculationEngine::fulfill_reservation`].
#[derive(Debug, Clone, PartialEq)]
pub struct Fulfillment {
    pub reservation: Reservation,
    pub borrowing: Borrowing,
}

impl<'conn> CirculationEngine<'conn> {
    pub fn new(conn: &'conn Connection, borrowing_limit: u32, loan_period: chrono::Duration) -> Self {
        Self {
            conn,
            borrowing_limit,
            loan_period,
        }
    }

    /// Due date for a loan issued now. Saturates at the latest representable
    /// instant rather than overflowing.
    pub fn default_due_date(&self) -> DateTime<Utc> {
        Utc::now()
            .checked_add_signed(self.loan_period)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Lend an AVAILABLE book to an ACTIVE person who is under the borrowing
    /// cap. The borrowing row and the book status change commit together.
    pub fn borrow(&self, book_id: i64, person_id: i64, due_date: DateTime<Utc>) -> Result<Borrowing> {
        let tx = db::begin_write(self.conn)?;

        let book = require_book(&tx, book_id)?;
        if book.status != BookStatus::Available {
            return Err(LibraryError::BookUnavailable {
                book_id,
                status: book.status,
            });
        }
        require_active_person(&tx, person_id)?;
        self.check_limit(&tx, person_id)?;

        let borrowing = db::borrowings::insert_borrowing(&tx, book_id, person_id, Utc::now(), due_date)?;
        db::books::update_book_status(&tx, book_id, BookStatus::Borrowed)?;
        tx.commit().context("failed to commit borrowing")?;

        info!(
            borrowing_id = borrowing.id,
            book_id,
            person_id,
            due = %borrowing.due_date,
            "book borrowed"
        );
        Ok(borrowing)
    }

    /// Close an active borrowing and put the book back on the shelf.
    pub fn return_book(&self, borrowing_id: i64) -> Result<Borrowing> {
        let tx = db::begin_write(self.conn)?;

        let mut borrowing = db::borrowings::find_borrowing(&tx, borrowing_id)?
            .ok_or_else(|| LibraryError::not_found(Entity::Borrowing, borrowing_id))?;
        if borrowing.status == BorrowingStatus::Returned {
            return Err(LibraryError::AlreadyReturned { borrowing_id });
        }

        let returned_at = Utc::now();
        db::borrowings::mark_returned(&tx, borrowing_id, returned_at)?;
        db::books::update_book_status(&tx, borrowing.book_id, BookStatus::Available)?;
        tx.commit().context("failed to commit return")?;

        borrowing.status = BorrowingStatus::Returned;
        borrowing.return_date = Some(returned_at);
        info!(
            borrowing_id,
            book_id = borrowing.book_id,
            person_id = borrowing.person_id,
            "book returned"
        );
        Ok(borrowing)
    }

    /// Join the waiting queue for a book. An AVAILABLE book becomes RESERVED;
    /// a BORROWED one stays BORROWED until it comes back.
    pub fn reserve(&self, book_id: i64, person_id: i64) -> Result<Reservation> {
        let tx = db::begin_write(self.conn)?;

        let book = require_book(&tx, book_id)?;
        require_active_person(&tx, person_id)?;
        if db::reservations::find_reservation(&tx, book_id, person_id, ReservationStatus::Waiting)?
            .is_some()
        {
            return Err(LibraryError::DuplicateReservation { book_id, person_id });
        }
        if db::borrowings::has_active_borrowing(&tx, book_id, person_id)? {
            return Err(LibraryError::AlreadyBorrowing { book_id, person_id });
        }

        let reservation = db::reservations::insert_reservation(&tx, book_id, person_id, Utc::now())?;
        if book.status == BookStatus::Available {
            db::books::update_book_status(&tx, book_id, BookStatus::Reserved)?;
        }
        tx.commit().context("failed to commit reservation")?;

        info!(
            reservation_id = reservation.id,
            book_id,
            person_id,
            "book reserved"
        );
        Ok(reservation)
    }

    /// Withdraw a waiting reservation. When it was the last one holding a
    /// RESERVED book, the book becomes AVAILABLE again.
    pub fn cancel_reservation(&self, reservation_id: i64) -> Result<Reservation> {
        let tx = db::begin_write(self.conn)?;

        let mut reservation = require_waiting_reservation(&tx, reservation_id)?;
        db::reservations::update_reservation_status(
            &tx,
            reservation_id,
            ReservationStatus::Waiting,
            ReservationStatus::Cancelled,
        )?;

        let book = require_book(&tx, reservation.book_id)?;
        if book.status == BookStatus::Reserved
            && db::reservations::count_waiting_for_book(&tx, book.id)? == 0
        {
            db::books::update_book_status(&tx, book.id, BookStatus::Available)?;
        }
        tx.commit().context("failed to commit cancellation")?;

        reservation.status = ReservationStatus::Cancelled;
        info!(reservation_id, book_id = reservation.book_id, "reservation cancelled");
        Ok(reservation)
    }

    /// Hand a reserved book to the person at the head of its queue: the
    /// reservation is FULFILLED and a borrowing is opened in the same
    /// transaction, with the usual borrowing checks applied to the holder.
    pub fn fulfill_reservation(&self, reservation_id: i64, due_date: DateTime<Utc>) -> Result<Fulfillment> {
        let tx = db::begin_write(self.conn)?;

        let mut reservation = require_waiting_reservation(&tx, reservation_id)?;
        let book_id = reservation.book_id;
        let person_id = reservation.person_id;

        let queue = db::reservations::fetch_waiting_for_book(&tx, book_id)?;
        if let Some(position) = queue.iter().position(|queued| queued.id == reservation_id) {
            if position > 0 {
                return Err(LibraryError::PreconditionFailed(format!(
                    "reservation {reservation_id} is behind {position} other reservation(s) for book {book_id}"
                )));
            }
        }

        let book = require_book(&tx, book_id)?;
        if book.status == BookStatus::Borrowed {
            return Err(LibraryError::BookUnavailable {
                book_id,
                status: book.status,
            });
        }
        require_active_person(&tx, person_id)?;
        self.check_limit(&tx, person_id)?;

        db::reservations::update_reservation_status(
            &tx,
            reservation_id,
            ReservationStatus::Waiting,
            ReservationStatus::Fulfilled,
        )?;
        let borrowing = db::borrowings::insert_borrowing(&tx, book_id, person_id, Utc::now(), due_date)?;
        db::books::update_book_status(&tx, book_id, BookStatus::Borrowed)?;
        tx.commit().context("failed to commit fulfilment")?;

        reservation.status = ReservationStatus::Fulfilled;
        info!(
            reservation_id,
            borrowing_id = borrowing.id,
            book_id,
            person_id,
            "reservation fulfilled"
        );
        Ok(Fulfillment {
            reservation,
            borrowing,
        })
    }

    /// Remove a closed borrowing from the history.
    pub fn delete_borrowing(&self, borrowing_id: i64) -> Result<()> {
        let tx = db::begin_write(self.conn)?;

        let borrowing = db::borrowings::find_borrowing(&tx, borrowing_id)?
            .ok_or_else(|| LibraryError::not_found(Entity::Borrowing, borrowing_id))?;
        if borrowing.is_active() {
            return Err(LibraryError::PreconditionFailed(format!(
                "borrowing {borrowing_id} is still active"
            )));
        }

        db::borrowings::delete_borrowing(&tx, borrowing_id)?;
        tx.commit().context("failed to commit borrowing deletion")?;
        info!(borrowing_id, "borrowing deleted");
        Ok(())
    }

    /// Delete a book that nobody has borrowed or is waiting for.
    pub fn delete_book(&self, book_id: i64) -> Result<()> {
        let tx = db::begin_write(self.conn)?;

        require_book(&tx, book_id)?;
        let active = db::borrowings::count_active_for_book(&tx, book_id)?;
        let waiting = db::reservations::count_waiting_for_book(&tx, book_id)?;
        if active > 0 || waiting > 0 {
            return Err(LibraryError::PreconditionFailed(format!(
                "book {book_id} has {active} active borrowing(s) and {waiting} waiting reservation(s)"
            )));
        }

        db::books::delete_book(&tx, book_id)?;
        tx.commit().context("failed to commit book deletion")?;
        info!(book_id, "book deleted");
        Ok(())
    }

    /// Delete a person who holds no books and no waiting reservations.
    pub fn delete_person(&self, person_id: i64) -> Result<()> {
        let tx = db::begin_write(self.conn)?;

        require_person(&tx, person_id)?;
        let active = db::borrowings::count_active_borrowings(&tx, person_id)?;
        let waiting = db::reservations::count_waiting_for_person(&tx, person_id)?;
        if active > 0 || waiting > 0 {
            return Err(LibraryError::PreconditionFailed(format!(
                "person {person_id} has {active} active borrowing(s) and {waiting} waiting reservation(s)"
            )));
        }

        db::people::delete_person(&tx, person_id)?;
        tx.commit().context("failed to commit person deletion")?;
        info!(person_id, "person deleted");
        Ok(())
    }

    /// Look a borrowing up by id, returned or not.
    pub fn borrowing(&self, borrowing_id: i64) -> Result<Borrowing> {
        db::borrowings::find_borrowing(self.conn, borrowing_id)?
            .ok_or_else(|| LibraryError::not_found(Entity::Borrowing, borrowing_id))
    }

    /// Look a reservation up by id, whatever its status.
    pub fn reservation(&self, reservation_id: i64) -> Result<Reservation> {
        db::reservations::find_reservation_by_id(self.conn, reservation_id)?
            .ok_or_else(|| LibraryError::not_found(Entity::Reservation, reservation_id))
    }

    /// Books a person currently holds, soonest due first.
    pub fn active_borrowings(&self, person_id: i64) -> Result<Vec<Borrowing>> {
        require_person(self.conn, person_id)?;
        Ok(db::borrowings::fetch_active_borrowings(self.conn, person_id)?)
    }

    /// Waiting reservations for a book in the order they will be served.
    pub fn reservation_queue(&self, book_id: i64) -> Result<Vec<Reservation>> {
        require_book(self.conn, book_id)?;
        Ok(db::reservations::fetch_waiting_for_book(self.conn, book_id)?)
    }

    /// Books whose stored status disagrees with their circulation rows.
    ///
    /// An AVAILABLE book with waiting reservations is not reported: that is
    /// the state `return_book` leaves behind on purpose.
    pub fn consistency_violations(&self) -> Result<Vec<BookCirculation>> {
        let counts = db::books::fetch_circulation_counts(self.conn)?;
        Ok(counts.into_iter().filter(|entry| !is_consistent(entry)).collect())
    }

    fn check_limit(&self, conn: &Connection, person_id: i64) -> Result<()> {
        let active = db::borrowings::count_active_borrowings(conn, person_id)?;
        if active >= self.borrowing_limit {
            return Err(LibraryError::LimitExceeded {
                person_id,
                limit: self.borrowing_limit,
            });
        }
        Ok(())
    }
}

fn require_waiting_reservation(conn: &Connection, reservation_id: i64) -> Result<Reservation> {
    let reservation = db::reservations::find_reservation_by_id(conn, reservation_id)?
        .ok_or_else(|| LibraryError::not_found(Entity::Reservation, reservation_id))?;
    if reservation.status != ReservationStatus::Waiting {
        return Err(LibraryError::ReservationClosed {
            reservation_id,
            status: reservation.status,
        });
    }
    Ok(reservation)
}

fn is_consistent(entry: &BookCirculation) -> bool {
    let BookCirculation {
        book: Book { status, .. },
        active_borrowings,
        waiting_reservations,
    } = entry;

    let borrowed = *active_borrowings == 1;
    match status {
        BookStatus::Borrowed => borrowed,
        BookStatus::Reserved => *active_borrowings == 0 && *waiting_reservations > 0,
        BookStatus::Available => *active_borrowings == 0,
    }
}
