//! Human-readable library identifiers.
//!
//! Every person gets an id that encodes their type and, for most types, the
//! year they registered:
//!
//! | type    | shape            | example          |
//! |---------|------------------|------------------|
//! | MEMBER  | `LIBYYYY-NNNNNN` | `LIB2026-004213` |
//! | VISITOR | `VISYYYY-V-NNNN` | `VIS2026-V-0042` |
//! | STUDENT | `STUYYYY-S-NNNN` | `STU2026-S-0042` |
//! | VIP     | `VIP-NNN`        | `VIP-042`        |
//! | STAFF   | `STF-NNN`        | `STF-042`        |
//!
//! The numeric part is drawn uniformly at random, so two generated ids can
//! collide. Uniqueness is enforced by the `people.library_id` unique index and
//! [`crate::PersonStore::register`] retries on a collision.

use chrono::{Datelike, Local};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::PersonType;

struct Layout {
    prefix: &'static str,
    with_year: bool,
    tag: Option<char>,
    digits: u32,
}

fn layout(person_type: PersonType) -> Layout {
    match person_type {
        PersonType::Member => Layout {
            prefix: "LIB",
            with_year: true,
            tag: None,
            digits: 6,
        },
        PersonType::Visitor => Layout {
            prefix: "VIS",
            with_year: true,
            tag: Some('V'),
            digits: 4,
        },
        PersonType::Student => Layout {
            prefix: "STU",
            with_year: true,
            tag: Some('S'),
            digits: 4,
        },
        PersonType::Vip => Layout {
            prefix: "VIP",
            with_year: false,
            tag: None,
            digits: 3,
        },
        PersonType::Staff => Layout {
            prefix: "STF",
            with_year: false,
            tag: None,
            digits: 3,
        },
    }
}

/// Random source for new library ids.
pub struct IdentifierGenerator {
    rng: StdRng,
}

impl IdentifierGenerator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic generator for tests and reproducible imports.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generate an id stamped with the current local year.
    pub fn generate(&mut self, person_type: PersonType) -> String {
        self.generate_for_year(person_type, Local::now().year())
    }

    pub fn generate_for_year(&mut self, person_type: PersonType, year: i32) -> String {
        let layout = layout(person_type);
        let max = 10u32.pow(layout.digits) - 1;
        let number = self.rng.random_range(1..=max);
        let width = layout.digits as usize;

        let mut id = String::from(layout.prefix);
        if layout.with_year {
            id.push_str(&format!("{year:04}"));
        }
        id.push('-');
        if let Some(tag) = layout.tag {
            id.push(tag);
            id.push('-');
        }
        id.push_str(&format!("{number:0width$}"));
        id
    }
}

impl Default for IdentifierGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of [`validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validation {
    pub is_valid: bool,
    pub person_type: Option<PersonType>,
}

/// Components recovered from a well-formed id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedId {
    pub person_type: PersonType,
    /// Registration year; VIP and staff ids carry none.
    pub year: Option<i32>,
    pub sequence: u32,
}

/// Check whether `id` has the shape of a generated id and report its type.
pub fn validate(id: &str) -> Validation {
    match parse(id) {
        Some(parsed) => Validation {
            is_valid: true,
            person_type: Some(parsed.person_type),
        },
        None => Validation {
            is_valid: false,
            person_type: None,
        },
    }
}

/// Split a library id into type, year and sequence number.
pub fn parse(id: &str) -> Option<ParsedId> {
    let id = id.trim();
    PersonType::ALL
        .iter()
        .find_map(|person_type| parse_as(id, *person_type))
}

fn parse_as(id: &str, person_type: PersonType) -> Option<ParsedId> {
    let layout = layout(person_type);
    let mut rest = id.strip_prefix(layout.prefix)?;

    let year = if layout.with_year {
        let digits = rest.get(..4)?;
        if !all_digits(digits) {
            return None;
        }
        rest = &rest[4..];
        Some(digits.parse().ok()?)
    } else {
        None
    };

    rest = rest.strip_prefix('-')?;
    if let Some(tag) = layout.tag {
        rest = rest.strip_prefix(tag)?.strip_prefix('-')?;
    }

    if rest.len() != layout.digits as usize || !all_digits(rest) {
        return None;
    }

    Some(ParsedId {
        person_type,
        year,
        sequence: rest.parse().ok()?,
    })
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_match_their_type() {
        let mut generator = IdentifierGenerator::seeded(42);
        for person_type in PersonType::ALL {
            for _ in 0..200 {
                let id = generator.generate_for_year(*person_type, 2026);
                let validation = validate(&id);
                assert!(validation.is_valid, "{id} should be valid");
                assert_eq!(validation.person_type, Some(*person_type), "{id}");
            }
        }
    }

    #[test]
    fn member_ids_have_year_and_six_digits() {
        let mut generator = IdentifierGenerator::seeded(1);
        let id = generator.generate_for_year(PersonType::Member, 2026);
        assert!(id.starts_with("LIB2026-"), "{id}");
        assert_eq!(id.len(), "LIB2026-".len() + 6);
    }

    #[test]
    fn parse_extracts_year_and_sequence() {
        assert_eq!(
            parse("STU2025-S-0042"),
            Some(ParsedId {
                person_type: PersonType::Student,
                year: Some(2025),
                sequence: 42,
            })
        );
        assert_eq!(
            parse("STF-007"),
            Some(ParsedId {
                person_type: PersonType::Staff,
                year: None,
                sequence: 7,
            })
        );
    }

    #[test]
    fn malformed_ids_are_rejected() {
        for id in [
            "",
            "LIB2026-12345",
            "LIB2026-1234567",
            "LIB26-123456",
            "VIS2026-S-0042",
            "VIP-42",
            "VIP-04a",
            "XYZ-123",
            "LIB2026004213",
        ] {
            assert!(!validate(id).is_valid, "{id} should be invalid");
        }
    }

    #[test]
    fn seeded_generators_repeat() {
        let mut a = IdentifierGenerator::seeded(9);
        let mut b = IdentifierGenerator::seeded(9);
        assert_eq!(
            a.generate_for_year(PersonType::Vip, 2026),
            b.generate_for_year(PersonType::Vip, 2026)
        );
    }
}
