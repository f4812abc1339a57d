//! Answer repository speaking the PostgREST dialect used by hosted
//! relational backends: one row per session keyed by `uuid`, one column per
//! step (`step1`, `step2`, …).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use intake_core::model::{DerivedFields, RemoteSettings, SessionId, StepKey};
use reqwest::{Client, RequestBuilder, Url};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::repository::{AnswerRecord, AnswerRepository, Storage, StorageError};

type Row = Map<String, Value>;

const KEY_COLUMN: &str = "uuid";

#[derive(Clone)]
pub struct RestRepository {
    client: Client,
    settings: RemoteSettings,
}

impl RestRepository {
    #[must_use]
    pub fn new(settings: RemoteSettings) -> Self {
        Self::with_client(Client::new(), settings)
    }

    /// Use a preconfigured client (timeouts, proxy rules).
    #[must_use]
    pub fn with_client(client: Client, settings: RemoteSettings) -> Self {
        Self { client, settings }
    }

    fn table_url(&self) -> Result<Url, StorageError> {
        let mut url = self.settings.base_url().clone();
        url.path_segments_mut()
            .map_err(|()| StorageError::Connection("base URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(["rest", "v1", self.settings.table()]);
        Ok(url)
    }

    pub(crate) fn select_url(
        &self,
        session: SessionId,
        columns: &[String],
    ) -> Result<Url, StorageError> {
        let mut url = self.table_url()?;
        let select = if columns.is_empty() {
            KEY_COLUMN.to_owned()
        } else {
            columns.join(",")
        };
        url.query_pairs_mut()
            .append_pair(KEY_COLUMN, &format!("eq.{session}"))
            .append_pair("select", &select);
        Ok(url)
    }

    pub(crate) fn upsert_url(&self) -> Result<Url, StorageError> {
        let mut url = self.table_url()?;
        url.query_pairs_mut().append_pair("on_conflict", KEY_COLUMN);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", self.settings.api_key())
            .bearer_auth(self.settings.api_key())
    }

    async fn fetch_row(
        &self,
        session: SessionId,
        columns: &[String],
    ) -> Result<Option<Row>, StorageError> {
        let url = self.select_url(session, columns)?;
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Connection(format!(
                "remote store returned {status}"
            )));
        }

        let rows: Vec<Row> = response
            .json()
            .await
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        if rows.len() > 1 {
            warn!(session_id = %session, rows = rows.len(), "several rows share one session id");
        }
        Ok(rows.into_iter().next())
    }
}

/// Body of a partial upsert: the key column plus only the written steps.
pub(crate) fn upsert_body(session: SessionId, answers: &[(StepKey, String)]) -> Row {
    let mut body = Row::new();
    body.insert(KEY_COLUMN.to_owned(), Value::String(session.to_string()));
    for (step, value) in answers {
        body.insert(step.column(), Value::String(value.clone()));
    }
    body
}

/// Cells written by other clients may be typed; answers are always strings.
fn cell_to_string(cell: &Value) -> Option<String> {
    match cell {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn parse_timestamp(cell: Option<&Value>) -> Option<DateTime<Utc>> {
    cell.and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|t| t.with_timezone(&Utc))
}

pub(crate) fn decode_answers(row: &Row) -> BTreeMap<StepKey, String> {
    row.iter()
        .filter_map(|(column, cell)| {
            let step = StepKey::from_column(column)?;
            cell_to_string(cell).map(|value| (step, value))
        })
        .collect()
}

pub(crate) fn decode_derived(row: &Row) -> DerivedFields {
    let risk_score = row.get("risk_score").and_then(|cell| match cell {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    });
    let color_code = row.get("color_code").and_then(cell_to_string);
    DerivedFields {
        risk_score,
        color_code,
    }
}

#[async_trait]
impl AnswerRepository for RestRepository {
    async fn fetch_answers(
        &self,
        session: SessionId,
        steps: &[StepKey],
    ) -> Result<Option<BTreeMap<StepKey, String>>, StorageError> {
        let columns: Vec<String> = steps.iter().map(StepKey::column).collect();
        let row = self.fetch_row(session, &columns).await?;
        Ok(row.map(|row| {
            decode_answers(&row)
                .into_iter()
                .filter(|(step, _)| steps.contains(step))
                .collect()
        }))
    }

    async fn fetch_record(
        &self,
        session: SessionId,
    ) -> Result<Option<AnswerRecord>, StorageError> {
        let Some(row) = self.fetch_row(session, &["*".to_owned()]).await? else {
            return Ok(None);
        };
        Ok(Some(AnswerRecord {
            session_id: session,
            answers: decode_answers(&row),
            derived: decode_derived(&row),
            created_at: parse_timestamp(row.get("created_at")),
            updated_at: parse_timestamp(row.get("updated_at")),
        }))
    }

    /// The hosted backend stamps rows itself, so `_at` is not sent.
    async fn upsert_answers(
        &self,
        session: SessionId,
        answers: &[(StepKey, String)],
        _at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        if answers.is_empty() {
            return Ok(());
        }
        let url = self.upsert_url()?;
        let response = self
            .authorize(self.client.post(url))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&upsert_body(session, answers))
            .send()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Connection(format!(
                "remote store returned {status}"
            )));
        }
        debug!(session_id = %session, steps = answers.len(), "answers upserted remotely");
        Ok(())
    }
}

impl Storage {
    /// Build a `Storage` backed by the hosted record store.
    #[must_use]
    pub fn remote(settings: RemoteSettings) -> Self {
        let answers: Arc<dyn AnswerRepository> = Arc::new(RestRepository::new(settings));
        Self { answers }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_core::model::RemoteSettingsDraft;
    use serde_json::json;

    fn repo(base: &str) -> RestRepository {
        RestRepository::new(
            RemoteSettingsDraft {
                base_url: Some(base.into()),
                api_key: Some("anon-key".into()),
                table: None,
            }
            .validate()
            .unwrap(),
        )
    }

    fn key(n: u32) -> StepKey {
        StepKey::new(n).unwrap()
    }

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn select_url_filters_by_session_and_columns() {
        let session: SessionId = "6f1c0c44-3a1e-4b7f-9a3e-2d7d1f0b9c11".parse().unwrap();
        let url = repo("https://db.example.com")
            .select_url(session, &[key(2).column(), key(3).column()])
            .unwrap();
        assert_eq!(url.path(), "/rest/v1/responses");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("uuid".into(), format!("eq.{session}")),
                ("select".into(), "step2,step3".into()),
            ]
        );
    }

    #[test]
    fn select_url_without_columns_selects_key() {
        let url = repo("https://db.example.com/")
            .select_url(SessionId::generate(), &[])
            .unwrap();
        assert!(url.query().unwrap().ends_with("select=uuid"));
    }

    #[test]
    fn table_url_keeps_base_path() {
        let url = repo("https://example.com/backend").upsert_url().unwrap();
        assert_eq!(url.path(), "/backend/rest/v1/responses");
        assert_eq!(url.query(), Some("on_conflict=uuid"));
    }

    #[test]
    fn upsert_body_only_carries_written_steps() {
        let session = SessionId::generate();
        let body = upsert_body(session, &[(key(11), "1200".into())]);
        assert_eq!(body.len(), 2);
        assert_eq!(body["uuid"], json!(session.to_string()));
        assert_eq!(body["step11"], json!("1200"));
    }

    #[test]
    fn decode_stringifies_typed_cells_and_skips_nulls() {
        let row = row(json!({
            "uuid": "x",
            "step1": "patrimoine",
            "step2": 5000,
            "step5": true,
            "step6": {"livret": 3000},
            "step7": null,
            "risk_score": "4",
            "color_code": "orange"
        }));
        let answers = decode_answers(&row);
        assert_eq!(answers.len(), 4);
        assert_eq!(answers[&key(1)], "patrimoine");
        assert_eq!(answers[&key(2)], "5000");
        assert_eq!(answers[&key(5)], "true");
        assert_eq!(answers[&key(6)], r#"{"livret":3000}"#);

        let derived = decode_derived(&row);
        assert_eq!(derived.risk_score, Some(4));
        assert_eq!(derived.color_code.as_deref(), Some("orange"));
    }

    #[test]
    fn timestamps_parse_rfc3339() {
        let row = row(json!({"created_at": "2024-03-01T10:00:00+01:00"}));
        let at = parse_timestamp(row.get("created_at")).unwrap();
        assert_eq!(at.to_rfc3339(), "2024-03-01T09:00:00+00:00");
        assert_eq!(parse_timestamp(None), None);
    }
}
