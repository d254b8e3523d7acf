//! Runs against a live MongoDB. Start one and run with
//! `MONGO_URI=mongodb://localhost:27017 cargo test -- --ignored`.

use chrono::{TimeZone, Utc};
use mongodb::bson::doc;
use serde_json::json;
use uuid::Uuid;

use quiz_attempts_api::errors::AttemptError;
use quiz_attempts_api::models::{Attempt, SaveProgressRequest, StartAttemptRequest};
use quiz_attempts_api::services::attempt_store::AttemptStore;
use quiz_attempts_api::services::mongo_attempt_store::{MongoAttemptStore, ATTEMPTS_COLLECTION};

struct MongoFixture {
    db: mongodb::Database,
    store: MongoAttemptStore,
}

impl MongoFixture {
    async fn teardown(self) {
        let _ = self.db.drop().await;
    }
}

async fn create_store() -> MongoFixture {
    dotenvy::from_filename(".env.test").ok();
    let uri = std::env::var("MONGO_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string());

    let client = mongodb::Client::with_uri_str(&uri)
        .await
        .expect("Failed to connect to test MongoDB");
    // One database per test keeps parallel runs apart.
    let db = client.database(&format!("quiz_attempts_test_{}", Uuid::new_v4().simple()));

    let store = MongoAttemptStore::new(db.clone());
    store
        .ensure_indexes()
        .await
        .expect("Failed to create test indexes");

    MongoFixture { db, store }
}

fn new_attempt(id: &str) -> Attempt {
    let req = StartAttemptRequest {
        quiz_id: "quiz-mongo".to_string(),
        learner_id: "learner-mongo".to_string(),
        question_count: Some(4),
        time_limit_seconds: Some(900),
    };
    Attempt::new(
        &req,
        id.to_string(),
        Utc.with_ymd_and_hms(2026, 9, 14, 10, 0, 0).unwrap(),
    )
}

#[tokio::test]
#[ignore = "requires MongoDB"]
async fn test_save_with_current_version_replaces_record() {
    let fixture = create_store().await;
    let mut attempt = new_attempt("mongo-save");
    fixture.store.insert(&attempt).await.unwrap();

    let update = SaveProgressRequest {
        answers: Some([("q1".to_string(), json!({"choice": "c"}))].into()),
        ..Default::default()
    };
    let now = attempt.started_at + chrono::Duration::seconds(30);
    attempt.apply_progress(&update, now).unwrap();
    attempt.version += 1;
    fixture.store.save(&attempt, 1).await.unwrap();

    let stored = fixture.store.find_by_id("mongo-save").await.unwrap();
    assert_eq!(stored, attempt);
    assert_eq!(stored.version, 2);

    fixture.teardown().await;
}

#[tokio::test]
#[ignore = "requires MongoDB"]
async fn test_stale_version_save_is_a_conflict() {
    let fixture = create_store().await;
    let attempt = new_attempt("mongo-stale");
    fixture.store.insert(&attempt).await.unwrap();

    let mut winner = attempt.clone();
    winner.version = 2;
    fixture.store.save(&winner, 1).await.unwrap();

    let mut loser = attempt.clone();
    loser.version = 2;
    loser.current_question_index = 3;
    let err = fixture.store.save(&loser, 1).await.unwrap_err();
    assert!(matches!(err, AttemptError::Conflict(_)));

    let stored = fixture.store.find_by_id("mongo-stale").await.unwrap();
    assert_eq!(stored.current_question_index, 0);

    fixture.teardown().await;
}

#[tokio::test]
#[ignore = "requires MongoDB"]
async fn test_save_of_missing_attempt_is_not_found() {
    let fixture = create_store().await;
    let attempt = new_attempt("mongo-missing");

    let err = fixture.store.save(&attempt, 1).await.unwrap_err();
    assert!(matches!(err, AttemptError::NotFound(_)));

    let err = fixture.store.find_by_id("mongo-missing").await.unwrap_err();
    assert!(matches!(err, AttemptError::NotFound(_)));

    fixture.teardown().await;
}

#[tokio::test]
#[ignore = "requires MongoDB"]
async fn test_duplicate_insert_is_a_conflict() {
    let fixture = create_store().await;
    let attempt = new_attempt("mongo-dup");
    fixture.store.insert(&attempt).await.unwrap();

    let err = fixture.store.insert(&attempt).await.unwrap_err();
    assert!(matches!(err, AttemptError::Conflict(_)));

    let count = fixture
        .db
        .collection::<mongodb::bson::Document>(ATTEMPTS_COLLECTION)
        .count_documents(doc! { "id": "mongo-dup" })
        .await
        .unwrap();
    assert_eq!(count, 1);

    fixture.teardown().await;
}

#[tokio::test]
#[ignore = "requires MongoDB"]
async fn test_ping_reaches_server() {
    let fixture = create_store().await;
    fixture.store.ping().await.unwrap();
    fixture.teardown().await;
}
