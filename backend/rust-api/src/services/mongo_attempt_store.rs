use anyhow::Context;
use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Collection, Database, IndexModel};

use crate::errors::AttemptError;
use crate::models::Attempt;

pub const ATTEMPTS_COLLECTION: &str = "quiz_attempts";

const DUPLICATE_KEY_CODE: i32 = 11000;

/// MongoDB-backed store. Conditional writes filter on `{id, version}` so a
/// replace only lands when nobody wrote in between.
pub struct MongoAttemptStore {
    mongo: Database,
    attempts: Collection<Attempt>,
}

impl MongoAttemptStore {
    pub fn new(mongo: Database) -> Self {
        let attempts = mongo.collection::<Attempt>(ATTEMPTS_COLLECTION);
        Self { mongo, attempts }
    }

    pub async fn ensure_indexes(&self) -> anyhow::Result<()> {
        let by_id = IndexModel::builder()
            .keys(doc! { "id": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        let by_learner = IndexModel::builder()
            .keys(doc! { "learner_id": 1, "quiz_id": 1 })
            .build();

        self.attempts
            .create_indexes([by_id, by_learner])
            .await
            .context("Failed to create quiz_attempts indexes")?;

        tracing::info!("Indexes ensured for {}", ATTEMPTS_COLLECTION);
        Ok(())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        *err.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref we)) if we.code == DUPLICATE_KEY_CODE
    )
}

#[async_trait]
impl super::attempt_store::AttemptStore for MongoAttemptStore {
    async fn find_by_id(&self, id: &str) -> Result<Attempt, AttemptError> {
        self.attempts
            .find_one(doc! { "id": id })
            .await?
            .ok_or_else(|| AttemptError::NotFound(id.to_string()))
    }

    async fn insert(&self, attempt: &Attempt) -> Result<(), AttemptError> {
        match self.attempts.insert_one(attempt).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(AttemptError::Conflict(attempt.id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, attempt: &Attempt, expected_version: u64) -> Result<(), AttemptError> {
        let expected = i64::try_from(expected_version)
            .map_err(|_| AttemptError::Storage("attempt version overflow".to_string()))?;

        let result = self
            .attempts
            .replace_one(doc! { "id": &attempt.id, "version": expected }, attempt)
            .await?;

        if result.matched_count == 0 {
            // Distinguish a lost race from a record that never existed.
            let exists = self
                .attempts
                .count_documents(doc! { "id": &attempt.id })
                .await?
                > 0;
            return Err(if exists {
                AttemptError::Conflict(attempt.id.clone())
            } else {
                AttemptError::NotFound(attempt.id.clone())
            });
        }

        Ok(())
    }

    async fn ping(&self) -> Result<(), AttemptError> {
        self.mongo.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "mongodb"
    }
}
