//! Racing requests. Each thread opens its own connection to the same file,
//! the way independent request handlers would, and a barrier releases them
//! together. Exactly one contender may win each contested precondition.

mod support;

use std::collections::HashSet;
use std::sync::Barrier;
use std::thread;

use library_circulation::{BookStatus, ErrorKind, LibraryError, NewPerson, PersonType};
use support::{add_book, register, TestLibrary};

const CONTENDERS: usize = 8;

fn race<T, F>(test_library: &TestLibrary, contenders: usize, op: F) -> Vec<Result<T, LibraryError>>
where
    T: Send,
    F: Fn(&library_circulation::Library, usize) -> Result<T, LibraryError> + Sync,
{
    let barrier = Barrier::new(contenders);
    thread::scope(|scope| {
        let handles: Vec<_> = (0..contenders)
            .map(|n| {
                let barrier = &barrier;
                let op = &op;
                scope.spawn(move || {
                    let library = test_library.open();
                    barrier.wait();
                    op(&library, n)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("contender panicked"))
            .collect()
    })
}

fn split<T>(results: Vec<Result<T, LibraryError>>) -> (Vec<T>, Vec<ErrorKind>) {
    let mut wins = Vec::new();
    let mut losses = Vec::new();
    for result in results {
        match result {
            Ok(value) => wins.push(value),
            Err(err) => losses.push(err.kind()),
        }
    }
    (wins, losses)
}

#[test]
fn concurrent_check_ins_have_one_winner() {
    let test_library = TestLibrary::new();
    let person = register(&test_library.open(), "p1@example.org");

    let results = race(&test_library, CONTENDERS, |library, _| {
        library.attendance().check_in(person.id)
    });
    let (wins, losses) = split(results);

    assert_eq!(wins.len(), 1);
    assert!(losses.iter().all(|kind| *kind == ErrorKind::AlreadyCheckedIn));

    let library = test_library.open();
    let open: Vec<_> = library
        .attendance()
        .history(person.id)
        .unwrap()
        .into_iter()
        .filter(|session| session.is_open())
        .collect();
    assert_eq!(open.len(), 1);
}

#[test]
fn concurrent_borrows_of_one_book_have_one_winner() {
    let test_library = TestLibrary::new();
    let library = test_library.open();
    let book = add_book(&library, "b1");
    let people: Vec<_> = (0..CONTENDERS)
        .map(|n| register(&library, &format!("p{n}@example.org")).id)
        .collect();

    let results = race(&test_library, CONTENDERS, |library, n| {
        let circulation = library.circulation();
        circulation.borrow(book.id, people[n], circulation.default_due_date())
    });
    let (wins, losses) = split(results);

    assert_eq!(wins.len(), 1);
    assert!(losses.iter().all(|kind| *kind == ErrorKind::BookUnavailable));
    assert_eq!(library.catalog().find(book.id).unwrap().status, BookStatus::Borrowed);
    assert!(library.circulation().consistency_violations().unwrap().is_empty());
}

#[test]
fn concurrent_duplicate_reservations_have_one_winner() {
    let test_library = TestLibrary::new();
    let library = test_library.open();
    let book = add_book(&library, "b1");
    let person = register(&library, "p1@example.org");

    let results = race(&test_library, CONTENDERS, |library, _| {
        library.circulation().reserve(book.id, person.id)
    });
    let (wins, losses) = split(results);

    assert_eq!(wins.len(), 1);
    assert!(losses.iter().all(|kind| *kind == ErrorKind::DuplicateReservation));
    assert_eq!(library.circulation().reservation_queue(book.id).unwrap().len(), 1);
}

#[test]
fn borrowing_cap_holds_under_contention() {
    let test_library = TestLibrary::new();
    let library = test_library.open();
    let person = register(&library, "p1@example.org");
    let books: Vec<_> = (0..CONTENDERS)
        .map(|n| add_book(&library, &format!("b{n}")).id)
        .collect();

    let results = race(&test_library, CONTENDERS, |library, n| {
        let circulation = library.circulation();
        circulation.borrow(books[n], person.id, circulation.default_due_date())
    });
    let (wins, losses) = split(results);

    assert_eq!(wins.len(), 5);
    assert!(losses.iter().all(|kind| *kind == ErrorKind::LimitExceeded));
    assert!(library.circulation().consistency_violations().unwrap().is_empty());
}

#[test]
fn concurrent_registrations_get_distinct_library_ids() {
    let test_library = TestLibrary::new();

    let results = race(&test_library, CONTENDERS, |library, n| {
        library.people().register(NewPerson {
            name: format!("Staff {n}"),
            email: format!("staff{n}@example.org"),
            person_type: PersonType::Staff,
        })
    });
    let (wins, losses) = split(results);

    assert!(losses.is_empty(), "{losses:?}");
    let ids: HashSet<_> = wins.iter().map(|person| person.library_id.clone()).collect();
    assert_eq!(ids.len(), CONTENDERS);
}
