use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a session as seen by the answer store.
///
/// `Uninitialized -> IdentityResolved -> RecordAbsent | RecordPresent`, and a
/// successful write moves `RecordAbsent` to `RecordPresent`. There is no
/// terminal state: records live indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    IdentityResolved,
    RecordAbsent,
    RecordPresent,
}

impl SessionState {
    /// Whether `self -> next` is an allowed transition.
    #[must_use]
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::{IdentityResolved, RecordAbsent, RecordPresent, Uninitialized};
        matches!(
            (self, next),
            (Uninitialized, IdentityResolved)
                | (IdentityResolved, RecordAbsent | RecordPresent)
                | (RecordAbsent, RecordPresent)
        ) || self == next
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::IdentityResolved => "identity_resolved",
            SessionState::RecordAbsent => "record_absent",
            SessionState::RecordPresent => "record_present",
        };
        f.write_str(label)
    }
}
