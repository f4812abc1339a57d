use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Opaque identifier of one visitor's intake session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Creates a fresh random (v4) identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying uuid
    #[must_use]
    pub fn value(&self) -> Uuid {
        self.0
    }
}

/// Positive integer addressing one answer within a session record.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct StepKey(NonZeroU32);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum StepKeyError {
    #[error("step keys start at 1")]
    Zero,
}

impl StepKey {
    /// Creates a new `StepKey`.
    ///
    /// # Errors
    ///
    /// Returns `StepKeyError::Zero` for 0.
    pub fn new(step: u32) -> Result<Self, StepKeyError> {
        NonZeroU32::new(step).map(Self).ok_or(StepKeyError::Zero)
    }

    /// Returns the underlying step number
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0.get()
    }

    /// Backend column holding this step's answer (`step12`).
    #[must_use]
    pub fn column(&self) -> String {
        format!("step{}", self.0)
    }

    /// Parses a backend column name back into a key.
    #[must_use]
    pub fn from_column(column: &str) -> Option<Self> {
        parse_step_digits(column.strip_prefix("step")?)
    }
}

/// Plain ASCII digits only; `u32::from_str` would also take a leading `+`.
fn parse_step_digits(digits: &str) -> Option<StepKey> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u32>().ok().and_then(|n| StepKey::new(n).ok())
}

impl TryFrom<u32> for StepKey {
    type Error = StepKeyError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StepKey> for u32 {
    fn from(key: StepKey) -> Self {
        key.value()
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Debug for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StepKey({})", self.0)
    }
}

// ─── Display Implementations ───────────────────────────────────────────────────

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─── FromStr Implementations ───────────────────────────────────────────────────

/// Error type for parsing ID from string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    kind: &'static str,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {} from string", self.kind)
    }
}

impl std::error::Error for ParseIdError {}

impl FromStr for SessionId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(SessionId)
            .map_err(|_| ParseIdError { kind: "SessionId" })
    }
}

impl FromStr for StepKey {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s.strip_prefix("step").unwrap_or(s);
        parse_step_digits(digits).ok_or(ParseIdError { kind: "StepKey" })
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────────
