use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::AttemptError;
use crate::models::Attempt;

/// Persistence for attempt records.
///
/// `save` is conditional: it only succeeds when the stored record still has
/// `expected_version`, otherwise it fails with [`AttemptError::Conflict`].
#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Attempt, AttemptError>;

    async fn insert(&self, attempt: &Attempt) -> Result<(), AttemptError>;

    async fn save(&self, attempt: &Attempt, expected_version: u64) -> Result<(), AttemptError>;

    async fn ping(&self) -> Result<(), AttemptError>;

    fn backend_name(&self) -> &'static str;
}

/// Process-local store. Writes are serialized by the lock.
#[derive(Default)]
pub struct InMemoryAttemptStore {
    attempts: RwLock<HashMap<String, Attempt>>,
}

impl InMemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.attempts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.attempts.read().await.is_empty()
    }
}

#[async_trait]
impl AttemptStore for InMemoryAttemptStore {
    async fn find_by_id(&self, id: &str) -> Result<Attempt, AttemptError> {
        self.attempts
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AttemptError::NotFound(id.to_string()))
    }

    async fn insert(&self, attempt: &Attempt) -> Result<(), AttemptError> {
        let mut attempts = self.attempts.write().await;
        if attempts.contains_key(&attempt.id) {
            return Err(AttemptError::Conflict(attempt.id.clone()));
        }
        attempts.insert(attempt.id.clone(), attempt.clone());
        Ok(())
    }

    async fn save(&self, attempt: &Attempt, expected_version: u64) -> Result<(), AttemptError> {
        let mut attempts = self.attempts.write().await;
        let stored = attempts
            .get_mut(&attempt.id)
            .ok_or_else(|| AttemptError::NotFound(attempt.id.clone()))?;

        if stored.version != expected_version {
            tracing::debug!(
                "Version mismatch for attempt {}: stored={}, expected={}",
                attempt.id,
                stored.version,
                expected_version
            );
            return Err(AttemptError::Conflict(attempt.id.clone()));
        }

        *stored = attempt.clone();
        Ok(())
    }

    async fn ping(&self) -> Result<(), AttemptError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
