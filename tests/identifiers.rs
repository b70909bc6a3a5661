//! Library ids issued through registration against an on-disk database.

mod support;

use std::collections::HashSet;

use library_circulation::library_id::{self, IdentifierGenerator};
use library_circulation::{NewPerson, PersonType, PersonUpdate};
use support::TestLibrary;

#[test]
fn every_person_type_gets_a_matching_id() {
    let test_library = TestLibrary::new();
    let library = test_library.open();

    for (n, person_type) in PersonType::ALL.iter().enumerate() {
        let person = library
            .people()
            .register(NewPerson {
                name: format!("Reader {n}"),
                email: format!("reader{n}@example.org"),
                person_type: *person_type,
            })
            .unwrap();

        let parsed = library_id::parse(&person.library_id).unwrap();
        assert_eq!(parsed.person_type, *person_type);
        let has_year = !matches!(person_type, PersonType::Vip | PersonType::Staff);
        assert_eq!(parsed.year.is_some(), has_year);
        assert!(parsed.sequence >= 1);
        assert_eq!(
            library.people().find_by_library_id(&person.library_id).unwrap().id,
            person.id
        );
    }

    library.close().unwrap();
}

#[test]
fn ids_survive_type_changes_and_reopening() {
    let test_library = TestLibrary::new();
    let library = test_library.open();
    let person = support::register(&library, "kept@example.org");
    let updated = library
        .people()
        .update_profile(
            person.id,
            PersonUpdate {
                person_type: Some(PersonType::Staff),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(updated.library_id, person.library_id);
    library.close().unwrap();

    let reopened = test_library.open();
    assert_eq!(
        reopened.people().find(person.id).unwrap().library_id,
        person.library_id
    );
    reopened.close().unwrap();
}

#[test]
fn seeded_generators_repeat_their_draws() {
    let mut first = IdentifierGenerator::seeded(42);
    let mut second = IdentifierGenerator::seeded(42);
    let drawn: Vec<String> = (0..20)
        .map(|_| first.generate_for_year(PersonType::Member, 2026))
        .collect();
    let again: Vec<String> = (0..20)
        .map(|_| second.generate_for_year(PersonType::Member, 2026))
        .collect();
    assert_eq!(drawn, again);

    let distinct: HashSet<&String> = drawn.iter().collect();
    assert!(distinct.len() > 1);
    assert!(drawn.iter().all(|id| library_id::validate(id).is_valid));
}

#[test]
fn registered_ids_are_unique() {
    let test_library = TestLibrary::new();
    let library = test_library.open();

    let ids: HashSet<String> = (0..50)
        .map(|n| {
            library
                .people()
                .register(NewPerson {
                    name: format!("Staff {n}"),
                    email: format!("staff{n}@example.org"),
                    person_type: PersonType::Staff,
                })
                .unwrap()
                .library_id
        })
        .collect();
    assert_eq!(ids.len(), 50);

    library.close().unwrap();
}
