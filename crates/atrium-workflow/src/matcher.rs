//! Subject matching against spec lists.
//!
//! One routine backs both eligibility questions the engine asks: "may
//! this subject submit a request through this flow" (against the flow's
//! requester specs) and "may this subject act on the current step"
//! (against that step's approver specs).

use atrium_core::Subject;

use crate::types::SubjectSpec;

/// Whether any spec in the list matches the subject.
///
/// OR across the list: a single match suffices, never all. An empty list
/// matches nothing; callers that treat an empty list as unrestricted
/// check for that explicitly.
#[must_use]
pub fn matches_any(specs: &[SubjectSpec], subject: &Subject) -> bool {
    specs.iter().any(|spec| spec.matches(subject))
}
