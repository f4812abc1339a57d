use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use super::ids::StepKey;

/// Declared value type of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    Text,
    Integer,
    Decimal,
    Boolean,
    Json,
    Url,
}

impl fmt::Display for AnswerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnswerKind::Text => "text",
            AnswerKind::Integer => "integer",
            AnswerKind::Decimal => "decimal",
            AnswerKind::Boolean => "boolean",
            AnswerKind::Json => "json",
            AnswerKind::Url => "url",
        };
        f.write_str(name)
    }
}

/// A decoded answer.
///
/// Storage only ever sees the string produced by [`Answer::encode`]; the typed
/// form exists at the store boundary so call sites never parse raw strings.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Text(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    Json(serde_json::Value),
    Url(Url),
}

/// Reasons a raw value cannot be decoded as its declared kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CodecError {
    #[error("expected an integer, got {0:?}")]
    NotAnInteger(String),
    #[error("expected a decimal number, got {0:?}")]
    NotADecimal(String),
    #[error("expected true or false, got {0:?}")]
    NotABoolean(String),
    #[error("invalid JSON: {0}")]
    Json(String),
    #[error("invalid URL: {0}")]
    Url(String),
}

/// Errors raised when an answer does not fit the schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum AnswerError {
    #[error("step {0} is not declared in the schema")]
    UnknownStep(StepKey),
    #[error("step {step} expects {kind}: {source}")]
    InvalidValue {
        step: StepKey,
        kind: AnswerKind,
        #[source]
        source: CodecError,
    },
    #[error("step {step} expects {expected}, got {found}")]
    KindMismatch {
        step: StepKey,
        expected: AnswerKind,
        found: AnswerKind,
    },
}

impl Answer {
    #[must_use]
    pub fn kind(&self) -> AnswerKind {
        match self {
            Answer::Text(_) => AnswerKind::Text,
            Answer::Integer(_) => AnswerKind::Integer,
            Answer::Decimal(_) => AnswerKind::Decimal,
            Answer::Boolean(_) => AnswerKind::Boolean,
            Answer::Json(_) => AnswerKind::Json,
            Answer::Url(_) => AnswerKind::Url,
        }
    }

    /// Serialize into the opaque string form kept by storage.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Answer::Text(text) => text.clone(),
            Answer::Integer(n) => n.to_string(),
            Answer::Decimal(n) => n.to_string(),
            Answer::Boolean(b) => b.to_string(),
            Answer::Json(value) => value.to_string(),
            Answer::Url(url) => url.to_string(),
        }
    }

    /// Decode a stored string as `kind`.
    ///
    /// # Errors
    ///
    /// Returns `CodecError` when `raw` is not a valid representation of `kind`.
    pub fn decode(kind: AnswerKind, raw: &str) -> Result<Self, CodecError> {
        match kind {
            AnswerKind::Text => Ok(Answer::Text(raw.to_owned())),
            AnswerKind::Integer => raw
                .trim()
                .parse::<i64>()
                .map(Answer::Integer)
                .map_err(|_| CodecError::NotAnInteger(raw.to_owned())),
            AnswerKind::Decimal => {
                let normalized = raw.trim().replace(',', ".");
                match normalized.parse::<f64>() {
                    Ok(n) if n.is_finite() => Ok(Answer::Decimal(n)),
                    _ => Err(CodecError::NotADecimal(raw.to_owned())),
                }
            }
            AnswerKind::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Answer::Boolean(true)),
                "false" => Ok(Answer::Boolean(false)),
                _ => Err(CodecError::NotABoolean(raw.to_owned())),
            },
            AnswerKind::Json => serde_json::from_str(raw)
                .map(Answer::Json)
                .map_err(|e| CodecError::Json(e.to_string())),
            AnswerKind::Url => Url::parse(raw.trim())
                .map(Answer::Url)
                .map_err(|e| CodecError::Url(e.to_string())),
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Answer::Text(text) => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Answer::Integer(n) => Some(*n),
            _ => None,
        }
    }
}
