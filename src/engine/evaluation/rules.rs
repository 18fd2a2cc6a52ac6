use chrono::NaiveDate;

use super::super::catalog::CatalogEntry;
use super::super::domain::Completion;

/// Standing of one training requirement as of the evaluation date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementStanding {
    /// Training held and inside its validity window.
    Current,
    /// Validity lapsed but the grace window still masks the lapse.
    InGrace {
        expired_on: NaiveDate,
        hard_deadline: NaiveDate,
    },
    /// Past the hard deadline.
    Expired { expired_on: NaiveDate },
    /// No completion on record as of the evaluation date.
    Missing,
}

/// Classify a requirement from the person's completion history.
///
/// Completions dated after `as_of` are not yet in effect and are ignored.
/// The most recent remaining completion decides the standing:
/// `expiry = completed_on + validity`, `hard_deadline = expiry + grace`,
/// expired only when `as_of` is strictly past the hard deadline.
pub(super) fn requirement_standing(
    entry: &CatalogEntry,
    completions: &[Completion],
    as_of: NaiveDate,
) -> RequirementStanding {
    let latest = completions
        .iter()
        .filter(|completion| completion.completed_on <= as_of)
        .max_by_key(|completion| completion.completed_on);

    let Some(completion) = latest else {
        return RequirementStanding::Missing;
    };

    let expired_on = entry.expiry(completion.completed_on);
    let hard_deadline = entry.hard_deadline(completion.completed_on);

    if as_of <= expired_on {
        RequirementStanding::Current
    } else if as_of <= hard_deadline {
        RequirementStanding::InGrace {
            expired_on,
            hard_deadline,
        }
    } else {
        RequirementStanding::Expired { expired_on }
    }
}
