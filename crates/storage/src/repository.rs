use async_trait::async_trait;
use chrono::{DateTime, Utc};
use intake_core::model::{DerivedFields, SessionId, StepKey};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Persisted shape of one session's answers.
///
/// `answers` is sparse: a step is either absent (never answered) or holds the
/// last value written for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRecord {
    pub session_id: SessionId,
    pub answers: BTreeMap<StepKey, String>,
    pub derived: DerivedFields,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl AnswerRecord {
    #[must_use]
    pub fn new(session_id: SessionId, at: DateTime<Utc>) -> Self {
        Self {
            session_id,
            answers: BTreeMap::new(),
            derived: DerivedFields::default(),
            created_at: Some(at),
            updated_at: Some(at),
        }
    }

    #[must_use]
    pub fn get(&self, step: StepKey) -> Option<&str> {
        self.answers.get(&step).map(String::as_str)
    }

    /// Answers restricted to `steps`, in key order.
    #[must_use]
    pub fn select(&self, steps: &[StepKey]) -> BTreeMap<StepKey, String> {
        steps
            .iter()
            .filter_map(|step| self.answers.get(step).map(|v| (*step, v.clone())))
            .collect()
    }
}

/// Record store keyed by session identity.
#[async_trait]
pub trait AnswerRepository: Send + Sync {
    /// Fetch only the requested steps of a session's record.
    ///
    /// Returns `Ok(None)` when the session has no record yet; steps that were
    /// never answered are simply missing from the map.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn fetch_answers(
        &self,
        session: SessionId,
        steps: &[StepKey],
    ) -> Result<Option<BTreeMap<StepKey, String>>, StorageError>;

    /// Fetch the whole record, including derived fields.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn fetch_record(&self, session: SessionId)
    -> Result<Option<AnswerRecord>, StorageError>;

    /// Create or partially update a session's record in one write.
    ///
    /// Only the listed steps change; a later entry for the same step wins.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write is rejected. Nothing is written in
    /// that case.
    async fn upsert_answers(
        &self,
        session: SessionId,
        answers: &[(StepKey, String)],
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Whether a record exists for `session`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn record_exists(&self, session: SessionId) -> Result<bool, StorageError> {
        Ok(self.fetch_answers(session, &[]).await?.is_some())
    }
}

/// Durable client-side slot holding the visitor's session identifier.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Load the persisted identifier, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read.
    async fn load(&self) -> Result<Option<SessionId>, StorageError>;

    /// Persist the identifier, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be written.
    async fn save(&self, id: SessionId) -> Result<(), StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    records: Arc<Mutex<HashMap<SessionId, AnswerRecord>>>,
    identity: Arc<Mutex<Option<SessionId>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            identity: Arc::new(Mutex::new(None)),
        }
    }

    /// Stand-in for the backend job that scores a session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the session has no record.
    pub fn publish_derived(
        &self,
        session: SessionId,
        derived: DerivedFields,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let record = guard.get_mut(&session).ok_or(StorageError::NotFound)?;
        record.derived = derived;
        Ok(())
    }
}

#[async_trait]
impl AnswerRepository for InMemoryRepository {
    async fn fetch_answers(
        &self,
        session: SessionId,
        steps: &[StepKey],
    ) -> Result<Option<BTreeMap<StepKey, String>>, StorageError> {
        let guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&session).map(|record| record.select(steps)))
    }

    async fn fetch_record(
        &self,
        session: SessionId,
    ) -> Result<Option<AnswerRecord>, StorageError> {
        let guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&session).cloned())
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
        let mut guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let record = guard
            .entry(session)
            .or_insert_with(|| AnswerRecord::new(session, at));
        for (step, value) in answers {
            record.answers.insert(*step, value.clone());
        }
        record.updated_at = Some(at);
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for InMemoryRepository {
    async fn load(&self) -> Result<Option<SessionId>, StorageError> {
        let guard = self
            .identity
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(*guard)
    }

    async fn save(&self, id: SessionId) -> Result<(), StorageError> {
        let mut guard = self
            .identity
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        *guard = Some(id);
        Ok(())
    }
}

/// Answer backend behind a trait object for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub answers: Arc<dyn AnswerRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let answers: Arc<dyn AnswerRepository> = Arc::new(InMemoryRepository::new());
        Self { answers }
    }
}
