//! Candidate selection rules.
//!
//! Backends must agree with [`is_candidate`]: the in-memory repository calls
//! it directly, the SQLite repository expresses the same filter in SQL.
//! Among qualifying users the first in creation order wins.

use std::collections::HashSet;

use crate::catalog::ALL_UNIVERSITIES;
use crate::profile::{Profile, User, UserId};

/// True if the viewer's filter places no restriction on university.
pub fn accepts_any_university(viewer: &Profile) -> bool {
    viewer
        .preferred_universities
        .iter()
        .any(|u| u == ALL_UNIVERSITIES)
}

/// Whether `candidate` may be offered to `viewer`.
///
/// `already_liked` holds every identity the viewer has an outbound like edge
/// towards. Skips leave no record, so a skipped candidate qualifies again.
pub fn is_candidate(
    viewer_id: UserId,
    viewer: &Profile,
    candidate: &User,
    already_liked: &HashSet<UserId>,
) -> bool {
    if candidate.id == viewer_id || already_liked.contains(&candidate.id) {
        return false;
    }
    let Some(profile) = &candidate.profile else {
        return false;
    };
    if profile.gender != viewer.looking_for {
        return false;
    }
    accepts_any_university(viewer)
        || viewer
            .preferred_universities
            .iter()
            .any(|u| *u == profile.university)
}

/// First qualifying candidate in the given (creation-ordered) sequence.
pub fn first_candidate<'a>(
    viewer_id: UserId,
    viewer: &Profile,
    users: impl IntoIterator<Item = &'a User>,
    already_liked: &HashSet<UserId>,
) -> Option<&'a User> {
    users
        .into_iter()
        .find(|u| is_candidate(viewer_id, viewer, u, already_liked))
}
