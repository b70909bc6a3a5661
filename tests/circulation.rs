//! End-to-end circulation scenarios against an on-disk database.

mod support;

use library_circulation::{BookStatus, BorrowingStatus, ErrorKind, ReservationStatus};
use support::{add_book, register, TestLibrary};

#[test]
fn borrow_and_return_round_trip() {
    let test_library = TestLibrary::new();
    let library = test_library.open();
    let book = add_book(&library, "b1");
    let person = register(&library, "p1@example.org");
    let circulation = library.circulation();

    let due = chrono::Utc::now() + chrono::Duration::days(14);
    let borrowing = circulation.borrow(book.id, person.id, due).unwrap();
    assert_eq!(borrowing.status, BorrowingStatus::Borrowed);
    assert_eq!(library.catalog().find(book.id).unwrap().status, BookStatus::Borrowed);
    assert!(circulation.consistency_violations().unwrap().is_empty());

    let returned = circulation.return_book(borrowing.id).unwrap();
    assert_eq!(returned.status, BorrowingStatus::Returned);
    assert_eq!(library.catalog().find(book.id).unwrap().status, BookStatus::Available);
    assert_eq!(
        circulation.borrowing(borrowing.id).unwrap().status,
        BorrowingStatus::Returned
    );
    assert!(circulation.consistency_violations().unwrap().is_empty());

    library.close().unwrap();
}

#[test]
fn reservation_scenario() {
    let test_library = TestLibrary::new();
    let library = test_library.open();
    let book = add_book(&library, "b1");
    let person = register(&library, "p1@example.org");
    let circulation = library.circulation();

    let reservation = circulation.reserve(book.id, person.id).unwrap();
    assert_eq!(reservation.status, ReservationStatus::Waiting);
    assert_eq!(library.catalog().find(book.id).unwrap().status, BookStatus::Reserved);

    let err = circulation.reserve(book.id, person.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateReservation);
    assert_eq!(err.http_status(), 409);

    // A reserved book is not on the shelf until the holder picks it up.
    let other = register(&library, "p2@example.org");
    let err = circulation
        .borrow(book.id, other.id, circulation.default_due_date())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BookUnavailable);

    let fulfilment = circulation
        .fulfill_reservation(reservation.id, circulation.default_due_date())
        .unwrap();
    assert_eq!(fulfilment.borrowing.person_id, person.id);
    assert_eq!(library.catalog().find(book.id).unwrap().status, BookStatus::Borrowed);
    assert!(circulation.consistency_violations().unwrap().is_empty());
}

#[test]
fn failed_operations_leave_no_trace() {
    let test_library = TestLibrary::new();
    let library = test_library.open();
    let person = register(&library, "p1@example.org");
    let circulation = library.circulation();

    let err = circulation
        .borrow(999, person.id, circulation.default_due_date())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.http_status(), 404);
    assert!(circulation.active_borrowings(person.id).unwrap().is_empty());
}

#[test]
fn data_survives_reopening() {
    let test_library = TestLibrary::new();
    let (book_id, person_id) = {
        let library = test_library.open();
        let book = add_book(&library, "b1");
        let person = register(&library, "p1@example.org");
        library
            .circulation()
            .borrow(book.id, person.id, library.circulation().default_due_date())
            .unwrap();
        library.close().unwrap();
        (book.id, person.id)
    };

    let library = test_library.open();
    assert_eq!(library.catalog().find(book_id).unwrap().status, BookStatus::Borrowed);
    assert_eq!(library.circulation().active_borrowings(person_id).unwrap().len(), 1);
}
