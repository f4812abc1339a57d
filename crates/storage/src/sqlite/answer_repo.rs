use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use intake_core::model::{SessionId, StepKey};
use tracing::debug;

use crate::repository::{AnswerRecord, AnswerRepository, StorageError};

use super::SqliteRepository;
use super::mapping::{map_answer_rows, map_record, step_to_i64};

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

impl SqliteRepository {
    async fn session_exists(&self, session: &str) -> Result<bool, StorageError> {
        let row = sqlx::query("SELECT 1 FROM sessions WHERE session_id = ?1")
            .bind(session)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl AnswerRepository for SqliteRepository {
    async fn fetch_answers(
        &self,
        session: SessionId,
        steps: &[StepKey],
    ) -> Result<Option<BTreeMap<StepKey, String>>, StorageError> {
        let session = session.to_string();
        if !self.session_exists(&session).await? {
            return Ok(None);
        }
        if steps.is_empty() {
            return Ok(Some(BTreeMap::new()));
        }

        let mut sql = String::from(
            r"
            SELECT step, value
            FROM answers
            WHERE session_id = ?1 AND step IN (
            ",
        );
        for i in 0..steps.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('?');
            sql.push_str(&(i + 2).to_string());
        }
        sql.push_str(")\n");

        let mut q = sqlx::query(&sql).bind(session);
        for step in steps {
            q = q.bind(step_to_i64(*step));
        }

        let rows = q.fetch_all(&self.pool).await.map_err(conn)?;
        map_answer_rows(&rows).map(Some)
    }

    async fn fetch_record(
        &self,
        session: SessionId,
    ) -> Result<Option<AnswerRecord>, StorageError> {
        let session = session.to_string();
        let Some(session_row) = sqlx::query(
            r"
            SELECT session_id, risk_score, color_code, created_at, updated_at
            FROM sessions
            WHERE session_id = ?1
            ",
        )
        .bind(&session)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        else {
            return Ok(None);
        };

        let answer_rows = sqlx::query(
            r"
            SELECT step, value
            FROM answers
            WHERE session_id = ?1
            ORDER BY step ASC
            ",
        )
        .bind(&session)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        map_record(&session_row, &answer_rows).map(Some)
    }

    async fn upsert_answers(
        &self,
        session: SessionId,
        answers: &[(StepKey, String)],
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        if answers.is_empty() {
            return Ok(());
        }
        let session_key = session.to_string();
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO sessions (session_id, created_at, updated_at)
            VALUES (?1, ?2, ?2)
            ON CONFLICT(session_id) DO UPDATE SET
                updated_at = excluded.updated_at
            ",
        )
        .bind(&session_key)
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        for (step, value) in answers {
            sqlx::query(
                r"
                INSERT INTO answers (session_id, step, value, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(session_id, step) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                ",
            )
            .bind(&session_key)
            .bind(step_to_i64(*step))
            .bind(value.as_str())
            .bind(at)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        debug!(session_id = %session, steps = answers.len(), "answers upserted");
        Ok(())
    }
}
