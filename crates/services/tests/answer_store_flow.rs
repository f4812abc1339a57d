use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use intake_core::model::{
    Answer, AnswerError, DerivedFields, SessionId, SessionState, StepKey, StepSchema,
};
use intake_core::time::fixed_now;
use services::{AnswerStore, AnswerStoreError, AppServices, Clock, IdentityProvider};
use storage::repository::{
    AnswerRecord, AnswerRepository, InMemoryRepository, Storage, StorageError,
};
use storage::FileIdentityStore;

fn key(n: u32) -> StepKey {
    StepKey::new(n).unwrap()
}

/// Wraps the in-memory repository and rejects writes while `down` is set.
#[derive(Clone, Default)]
struct FlakyRepository {
    inner: InMemoryRepository,
    down: Arc<AtomicBool>,
}

#[async_trait]
impl AnswerRepository for FlakyRepository {
    async fn fetch_answers(
        &self,
        session: SessionId,
        steps: &[StepKey],
    ) -> Result<Option<BTreeMap<StepKey, String>>, StorageError> {
        self.inner.fetch_answers(session, steps).await
    }

    async fn fetch_record(
        &self,
        session: SessionId,
    ) -> Result<Option<AnswerRecord>, StorageError> {
        self.inner.fetch_record(session).await
    }

    async fn upsert_answers(
        &self,
        session: SessionId,
        answers: &[(StepKey, String)],
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("backend timed out".into()));
        }
        self.inner.upsert_answers(session, answers, at).await
    }
}

/// Every read fails.
struct UnreachableRepository;

#[async_trait]
impl AnswerRepository for UnreachableRepository {
    async fn fetch_answers(
        &self,
        _session: SessionId,
        _steps: &[StepKey],
    ) -> Result<Option<BTreeMap<StepKey, String>>, StorageError> {
        Err(StorageError::Connection("offline".into()))
    }

    async fn fetch_record(
        &self,
        _session: SessionId,
    ) -> Result<Option<AnswerRecord>, StorageError> {
        Err(StorageError::Connection("offline".into()))
    }

    async fn upsert_answers(
        &self,
        _session: SessionId,
        _answers: &[(StepKey, String)],
        _at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        Err(StorageError::Connection("offline".into()))
    }
}

fn store_over(repo: Arc<dyn AnswerRepository>) -> AnswerStore {
    let identity = Arc::new(IdentityProvider::new(Arc::new(InMemoryRepository::new())));
    AnswerStore::new(
        identity,
        repo,
        Arc::new(StepSchema::intake()),
        Clock::fixed(fixed_now()),
    )
}

#[tokio::test]
async fn new_session_reads_null_then_value() {
    let services = AppServices::in_memory(Clock::fixed(fixed_now()));
    let store = services.answers();

    assert_eq!(store.get_response(key(1)).await, None);
    store.update_response(key(1), "patrimoine").await.unwrap();
    assert_eq!(store.get_response(key(1)).await.as_deref(), Some("patrimoine"));
}

#[tokio::test]
async fn steps_are_written_independently() {
    let services = AppServices::in_memory(Clock::fixed(fixed_now()));
    let store = services.answers();

    store.update_response(key(2), "5000").await.unwrap();
    store.update_response(key(3), "250 € à 500 €").await.unwrap();

    assert_eq!(store.get_response(key(2)).await.as_deref(), Some("5000"));
    assert_eq!(
        store.get_response(key(3)).await.as_deref(),
        Some("250 € à 500 €")
    );
    assert_eq!(store.get_response(key(4)).await, None);
}

#[tokio::test]
async fn last_write_wins_per_step() {
    let services = AppServices::in_memory(Clock::fixed(fixed_now()));
    let store = services.answers();

    store.update_response(key(21), "prudent").await.unwrap();
    store.update_response(key(21), "dynamique").await.unwrap();
    assert_eq!(store.get_response(key(21)).await.as_deref(), Some("dynamique"));
}

#[tokio::test]
async fn failed_write_is_reported_and_keeps_prior_value() {
    let repo = FlakyRepository::default();
    let store = store_over(Arc::new(repo.clone()));

    store.update_response(key(11), "900").await.unwrap();

    repo.down.store(true, Ordering::SeqCst);
    let err = store.update_response(key(11), "1200").await.unwrap_err();
    assert!(matches!(err, AnswerStoreError::Storage(StorageError::Connection(_))));

    assert_eq!(store.get_response(key(11)).await.as_deref(), Some("900"));
}

#[tokio::test]
async fn invalid_values_never_reach_storage() {
    let services = AppServices::in_memory(Clock::fixed(fixed_now()));
    let store = services.answers();
    services.identity().ensure_identity().await;

    let err = store.update_response(key(11), "mille deux cents").await.unwrap_err();
    assert!(matches!(
        err,
        AnswerStoreError::Answer(AnswerError::InvalidValue { .. })
    ));
    let err = store.update_response(key(99), "x").await.unwrap_err();
    assert!(matches!(err, AnswerStoreError::Answer(AnswerError::UnknownStep(_))));

    assert_eq!(store.state().await, SessionState::RecordAbsent);
}

#[tokio::test]
async fn invalid_entry_rejects_whole_batch() {
    let services = AppServices::in_memory(Clock::fixed(fixed_now()));
    let store = services.answers();

    let result = store
        .update_responses(&[(key(7), "célibataire".into()), (key(8), "deux".into())])
        .await;
    assert!(result.is_err());
    assert_eq!(store.get_response(key(7)).await, None);
}

#[tokio::test]
async fn reads_before_identity_are_null() {
    let services = AppServices::in_memory(Clock::fixed(fixed_now()));
    let store = services.answers();

    assert_eq!(services.identity().current_identity(), None);
    assert_eq!(store.get_response(key(1)).await, None);
    assert_eq!(store.state().await, SessionState::Uninitialized);

    services.identity().ensure_identity().await;
    assert_eq!(store.state().await, SessionState::RecordAbsent);

    store.update_response(key(1), "retraite").await.unwrap();
    assert_eq!(store.state().await, SessionState::RecordPresent);
}

#[tokio::test]
async fn read_failures_read_as_unanswered() {
    let store = store_over(Arc::new(UnreachableRepository));
    store.identity().ensure_identity().await;

    assert_eq!(store.get_response(key(1)).await, None);
    assert!(store.derived_fields().await.is_empty());
    assert_eq!(store.state().await, SessionState::IdentityResolved);
    assert!(store.record().await.is_err());
}

#[tokio::test]
async fn typed_answers_use_the_schema_codec() {
    let services = AppServices::in_memory(Clock::fixed(fixed_now()));
    let store = services.answers();

    store.set_answer(key(5), &Answer::Boolean(true)).await.unwrap();
    assert_eq!(store.get_response(key(5)).await.as_deref(), Some("true"));
    assert_eq!(store.get_answer(key(5)).await, Some(Answer::Boolean(true)));

    let err = store
        .set_answer(key(5), &Answer::Text("oui".into()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AnswerStoreError::Answer(AnswerError::KindMismatch { .. })
    ));

    let upload = Answer::decode(
        intake_core::model::AnswerKind::Url,
        "https://files.example.com/ids/front.jpg",
    )
    .unwrap();
    store.set_answer(key(26), &upload).await.unwrap();
    assert_eq!(store.get_answer(key(26)).await, Some(upload));
}

#[tokio::test]
async fn derived_fields_come_from_the_backend() {
    let repo = InMemoryRepository::new();
    let store = store_over(Arc::new(repo.clone()));

    assert!(store.derived_fields().await.is_empty());

    store.update_response(key(21), "équilibré").await.unwrap();
    let session = store.identity().current_identity().unwrap();
    let derived = DerivedFields {
        risk_score: Some(3),
        color_code: Some("yellow".into()),
    };
    repo.publish_derived(session, derived.clone()).unwrap();

    assert_eq!(store.derived_fields().await, derived);
}

#[tokio::test]
async fn concurrent_reads_and_writes_settle_per_step() {
    let services = AppServices::in_memory(Clock::fixed(fixed_now()));
    let store = services.answers();

    let writes: Vec<_> = (0..3)
        .map(|n| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .update_response(key(12 + n), ((n + 1) * 1000).to_string())
                    .await
            })
        })
        .collect();
    for write in writes {
        write.await.unwrap().unwrap();
    }

    let values = store
        .get_responses(&[key(12), key(13), key(14), key(15)])
        .await;
    assert_eq!(values.len(), 3);
    assert_eq!(values[&key(12)], "1000");
    assert_eq!(values[&key(14)], "3000");
}

#[tokio::test]
async fn session_resumes_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let identity_path = dir.path().join("identity.json");
    let storage = Storage::sqlite("sqlite:file:memdb_resume?mode=memory&cache=shared")
        .await
        .expect("connect sqlite");
    let clock = Clock::fixed(fixed_now());

    let first = AppServices::new(
        &storage,
        Arc::new(FileIdentityStore::new(&identity_path)),
        clock,
    );
    first.answers().update_response(key(1), "patrimoine").await.unwrap();
    first.answers().update_response(key(2), "5000").await.unwrap();
    let original = first.identity().current_identity().unwrap();
    drop(first);

    let second = AppServices::new(
        &storage,
        Arc::new(FileIdentityStore::new(&identity_path)),
        clock,
    );
    let resumed = second.identity().ensure_identity().await;
    assert_eq!(resumed.id(), original);
    assert!(!resumed.is_degraded());
    assert_eq!(
        second.answers().get_response(key(1)).await.as_deref(),
        Some("patrimoine")
    );
    assert_eq!(
        second.answers().get_response(key(2)).await.as_deref(),
        Some("5000")
    );
}
