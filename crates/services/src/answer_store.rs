use std::collections::BTreeMap;
use std::sync::Arc;

use intake_core::Clock;
use intake_core::model::{Answer, DerivedFields, SessionState, StepKey, StepSchema};
use storage::repository::{AnswerRecord, AnswerRepository};
use tracing::{debug, error, warn};

use crate::error::AnswerStoreError;
use crate::identity_service::IdentityProvider;

/// Session-scoped get/set of step answers.
///
/// Reads never fail: a missing identity, a missing record or a backend error
/// all read as "no prior answer". Writes are validated against the schema and
/// report every failure to the caller; there is no retry here.
#[derive(Clone)]
pub struct AnswerStore {
    identity: Arc<IdentityProvider>,
    repo: Arc<dyn AnswerRepository>,
    schema: Arc<StepSchema>,
    clock: Clock,
}

impl AnswerStore {
    #[must_use]
    pub fn new(
        identity: Arc<IdentityProvider>,
        repo: Arc<dyn AnswerRepository>,
        schema: Arc<StepSchema>,
        clock: Clock,
    ) -> Self {
        Self {
            identity,
            repo,
            schema,
            clock,
        }
    }

    #[must_use]
    pub fn schema(&self) -> &StepSchema {
        &self.schema
    }

    #[must_use]
    pub fn identity(&self) -> Arc<IdentityProvider> {
        Arc::clone(&self.identity)
    }

    /// Stored raw value of `step`, or `None`.
    pub async fn get_response(&self, step: StepKey) -> Option<String> {
        self.get_responses(&[step]).await.remove(&step)
    }

    /// Stored raw values of the answered steps among `steps`, in one fetch.
    pub async fn get_responses(&self, steps: &[StepKey]) -> BTreeMap<StepKey, String> {
        let Some(session) = self.identity.current_identity() else {
            debug!("identity not resolved yet; reading as unanswered");
            return BTreeMap::new();
        };
        match self.repo.fetch_answers(session, steps).await {
            Ok(Some(answers)) => answers,
            Ok(None) => BTreeMap::new(),
            Err(err) => {
                warn!(session_id = %session, error = %err, "answer read failed; treating as unanswered");
                BTreeMap::new()
            }
        }
    }

    /// Persist one raw answer.
    ///
    /// # Errors
    ///
    /// Returns `AnswerStoreError::Answer` if the value does not fit the
    /// schema, or `AnswerStoreError::Storage` if the write was not stored.
    pub async fn update_response(
        &self,
        step: StepKey,
        value: impl Into<String>,
    ) -> Result<(), AnswerStoreError> {
        self.update_responses(&[(step, value.into())]).await
    }

    /// Persist several answers in a single atomic write.
    ///
    /// Every value is validated before anything is written.
    ///
    /// # Errors
    ///
    /// Same as [`AnswerStore::update_response`].
    pub async fn update_responses(
        &self,
        answers: &[(StepKey, String)],
    ) -> Result<(), AnswerStoreError> {
        for (step, value) in answers {
            self.schema.validate(*step, value)?;
        }
        if answers.is_empty() {
            return Ok(());
        }

        let session = self.identity.ensure_identity().await.id();
        self.repo
            .upsert_answers(session, answers, self.clock.now())
            .await
            .map_err(|err| {
                error!(
                    session_id = %session,
                    steps = ?answers.iter().map(|(s, _)| s.value()).collect::<Vec<_>>(),
                    error = %err,
                    "answer write failed"
                );
                err
            })?;
        debug!(session_id = %session, count = answers.len(), "answers saved");
        Ok(())
    }

    /// Typed read through the schema codec.
    ///
    /// A stored value that no longer decodes is logged and reads as `None`.
    pub async fn get_answer(&self, step: StepKey) -> Option<Answer> {
        let raw = self.get_response(step).await?;
        match self.schema.validate(step, &raw) {
            Ok(answer) => Some(answer),
            Err(err) => {
                warn!(step = step.value(), error = %err, "stored answer does not match schema");
                None
            }
        }
    }

    /// Typed write through the schema codec.
    ///
    /// # Errors
    ///
    /// Returns `AnswerStoreError::Answer` on a kind mismatch, otherwise as
    /// [`AnswerStore::update_response`].
    pub async fn set_answer(&self, step: StepKey, answer: &Answer) -> Result<(), AnswerStoreError> {
        self.schema.check(step, answer)?;
        self.update_response(step, answer.encode()).await
    }

    /// Backend-computed fields; empty when unavailable.
    pub async fn derived_fields(&self) -> DerivedFields {
        let Some(session) = self.identity.current_identity() else {
            return DerivedFields::default();
        };
        match self.repo.fetch_record(session).await {
            Ok(record) => record.map(|r| r.derived).unwrap_or_default(),
            Err(err) => {
                warn!(session_id = %session, error = %err, "derived field read failed");
                DerivedFields::default()
            }
        }
    }

    /// The whole record, for summaries and export.
    ///
    /// # Errors
    ///
    /// Returns `AnswerStoreError::Storage` if the backend cannot be read.
    pub async fn record(&self) -> Result<Option<AnswerRecord>, AnswerStoreError> {
        let Some(session) = self.identity.current_identity() else {
            return Ok(None);
        };
        Ok(self.repo.fetch_record(session).await?)
    }

    /// Where this session stands in its lifecycle.
    ///
    /// `IdentityResolved` is reported when the record lookup itself fails.
    pub async fn state(&self) -> SessionState {
        let Some(session) = self.identity.current_identity() else {
            return SessionState::Uninitialized;
        };
        match self.repo.record_exists(session).await {
            Ok(true) => SessionState::RecordPresent,
            Ok(false) => SessionState::RecordAbsent,
            Err(err) => {
                warn!(session_id = %session, error = %err, "record lookup failed");
                SessionState::IdentityResolved
            }
        }
    }
}
