use chrono::Duration;
use intake_core::model::{DerivedFields, SessionId, StepKey};
use intake_core::time::fixed_now;
use storage::repository::{AnswerRepository, StorageError};
use storage::sqlite::SqliteRepository;

fn key(n: u32) -> StepKey {
    StepKey::new(n).unwrap()
}

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

#[tokio::test]
async fn sqlite_missing_session_reads_as_none() {
    let repo = connect("memdb_missing").await;
    let session = SessionId::generate();

    assert!(repo.fetch_answers(session, &[key(1)]).await.unwrap().is_none());
    assert!(repo.fetch_record(session).await.unwrap().is_none());
    assert!(!repo.record_exists(session).await.unwrap());
}

#[tokio::test]
async fn sqlite_upsert_creates_record_and_patches_fields() {
    let repo = connect("memdb_patch").await;
    let session = SessionId::generate();
    let now = fixed_now();

    repo.upsert_answers(session, &[(key(2), "5000".into())], now)
        .await
        .unwrap();
    repo.upsert_answers(
        session,
        &[(key(3), "250 € à 500 €".into())],
        now + Duration::minutes(1),
    )
    .await
    .unwrap();
    repo.upsert_answers(session, &[(key(2), "7500".into())], now + Duration::minutes(2))
        .await
        .unwrap();

    let selected = repo
        .fetch_answers(session, &[key(2), key(3), key(4)])
        .await
        .unwrap()
        .expect("record exists");
    assert_eq!(selected.len(), 2);
    assert_eq!(selected[&key(2)], "7500");
    assert_eq!(selected[&key(3)], "250 € à 500 €");

    let record = repo.fetch_record(session).await.unwrap().expect("record");
    assert_eq!(record.session_id, session);
    assert_eq!(record.created_at, Some(now));
    assert_eq!(record.updated_at, Some(now + Duration::minutes(2)));
    assert!(record.derived.is_empty());
}

#[tokio::test]
async fn sqlite_sessions_are_isolated() {
    let repo = connect("memdb_isolated").await;
    let alice = SessionId::generate();
    let bob = SessionId::generate();

    repo.upsert_answers(alice, &[(key(1), "patrimoine".into())], fixed_now())
        .await
        .unwrap();
    repo.upsert_answers(bob, &[(key(1), "retraite".into())], fixed_now())
        .await
        .unwrap();

    let alice_answers = repo.fetch_answers(alice, &[key(1)]).await.unwrap().unwrap();
    let bob_answers = repo.fetch_answers(bob, &[key(1)]).await.unwrap().unwrap();
    assert_eq!(alice_answers[&key(1)], "patrimoine");
    assert_eq!(bob_answers[&key(1)], "retraite");
}

#[tokio::test]
async fn sqlite_batch_is_written_together() {
    let repo = connect("memdb_batch").await;
    let session = SessionId::generate();

    repo.upsert_answers(
        session,
        &[
            (key(7), "en couple".into()),
            (key(8), "2".into()),
            (key(9), "ingénieur".into()),
        ],
        fixed_now(),
    )
    .await
    .unwrap();

    let record = repo.fetch_record(session).await.unwrap().unwrap();
    let steps: Vec<u32> = record.answers.keys().map(StepKey::value).collect();
    assert_eq!(steps, vec![7, 8, 9]);
}

#[tokio::test]
async fn sqlite_empty_batch_is_a_no_op() {
    let repo = connect("memdb_empty_batch").await;
    let session = SessionId::generate();
    repo.upsert_answers(session, &[], fixed_now()).await.unwrap();
    assert!(!repo.record_exists(session).await.unwrap());
}

#[tokio::test]
async fn sqlite_derived_fields_are_read_back() {
    let repo = connect("memdb_derived").await;
    let session = SessionId::generate();
    let derived = DerivedFields {
        risk_score: Some(5),
        color_code: Some("green".into()),
    };

    assert!(matches!(
        repo.publish_derived(session, &derived).await,
        Err(StorageError::NotFound)
    ));

    repo.upsert_answers(session, &[(key(21), "dynamique".into())], fixed_now())
        .await
        .unwrap();
    repo.publish_derived(session, &derived).await.unwrap();

    let record = repo.fetch_record(session).await.unwrap().unwrap();
    assert_eq!(record.derived, derived);

    // answers written after scoring leave the derived fields in place
    repo.upsert_answers(session, &[(key(22), "10%".into())], fixed_now())
        .await
        .unwrap();
    let record = repo.fetch_record(session).await.unwrap().unwrap();
    assert_eq!(record.derived, derived);
}

#[tokio::test]
async fn sqlite_migrations_are_idempotent() {
    let repo = connect("memdb_migrate_twice").await;
    repo.migrate().await.expect("second migrate");
}
