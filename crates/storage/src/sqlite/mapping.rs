use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use intake_core::model::{DerivedFields, SessionId, StepKey};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::{AnswerRecord, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn step_to_i64(step: StepKey) -> i64 {
    i64::from(step.value())
}

pub(crate) fn step_from_i64(v: i64) -> Result<StepKey, StorageError> {
    let raw = u32::try_from(v)
        .map_err(|_| StorageError::Serialization(format!("step out of range: {v}")))?;
    StepKey::new(raw).map_err(ser)
}

pub(crate) fn session_id_from_str(raw: &str) -> Result<SessionId, StorageError> {
    raw.parse().map_err(ser)
}

/// Folds `(step, value)` rows into the sparse answer map.
pub(crate) fn map_answer_rows(rows: &[SqliteRow]) -> Result<BTreeMap<StepKey, String>, StorageError> {
    let mut answers = BTreeMap::new();
    for row in rows {
        let step = step_from_i64(row.try_get::<i64, _>("step").map_err(ser)?)?;
        let value: String = row.try_get("value").map_err(ser)?;
        answers.insert(step, value);
    }
    Ok(answers)
}

pub(crate) fn map_record(
    session_row: &SqliteRow,
    answer_rows: &[SqliteRow],
) -> Result<AnswerRecord, StorageError> {
    let session_id =
        session_id_from_str(&session_row.try_get::<String, _>("session_id").map_err(ser)?)?;
    let created_at: DateTime<Utc> = session_row.try_get("created_at").map_err(ser)?;
    let updated_at: DateTime<Utc> = session_row.try_get("updated_at").map_err(ser)?;

    Ok(AnswerRecord {
        session_id,
        answers: map_answer_rows(answer_rows)?,
        derived: DerivedFields {
            risk_score: session_row.try_get("risk_score").map_err(ser)?,
            color_code: session_row.try_get("color_code").map_err(ser)?,
        },
        created_at: Some(created_at),
        updated_at: Some(updated_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_conversion_rejects_non_positive() {
        assert!(step_from_i64(0).is_err());
        assert!(step_from_i64(-3).is_err());
        assert!(step_from_i64(i64::from(u32::MAX) + 1).is_err());
        assert_eq!(step_from_i64(12).unwrap().value(), 12);
    }

    #[test]
    fn session_id_parse_errors_are_serialization() {
        assert!(matches!(
            session_id_from_str("nope"),
            Err(StorageError::Serialization(_))
        ));
    }
}
