use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::errors::AttemptError;
use crate::metrics::{
    track_store_operation, ATTEMPTS_CLOSED_TOTAL, ATTEMPTS_STARTED_TOTAL, PROGRESS_SAVES_TOTAL,
    VIOLATIONS_RECORDED_TOTAL, WRITE_CONFLICTS_TOTAL,
};
use crate::models::{
    Attempt, AttemptStatus, RecordViolationRequest, RecordViolationResponse, SaveProgressRequest,
    SaveProgressResponse, StartAttemptRequest, ViolationKind,
};
use crate::utils::retry::{retry_on, RetryConfig};

use super::attempt_store::AttemptStore;
use super::clock::Clock;
use super::violation_events::{ViolationEvent, ViolationPublisher};

type AttemptResult<T> = Result<T, AttemptError>;

/// Autosave, violation recording and lifecycle gatekeeping for quiz attempts.
///
/// Each mutation reads the record, checks it is still `in_progress`, applies
/// the change and writes it back conditioned on the version it read. Lost
/// races are retried from the read; storage failures are not.
pub struct AttemptService {
    store: Arc<dyn AttemptStore>,
    clock: Arc<dyn Clock>,
    publisher: ViolationPublisher,
    retry: RetryConfig,
}

impl AttemptService {
    pub fn new(
        store: Arc<dyn AttemptStore>,
        clock: Arc<dyn Clock>,
        publisher: ViolationPublisher,
        retry: RetryConfig,
    ) -> Self {
        Self {
            store,
            clock,
            publisher,
            retry,
        }
    }

    pub async fn start_attempt(&self, req: &StartAttemptRequest) -> AttemptResult<Attempt> {
        req.validate()?;

        let attempt = Attempt::new(req, Uuid::new_v4().to_string(), self.clock.now());
        let result = track_store_operation(
            "insert",
            self.store.backend_name(),
            self.store.insert(&attempt),
        )
        .await;

        ATTEMPTS_STARTED_TOTAL
            .with_label_values(&[outcome_label(&result)])
            .inc();
        result?;

        tracing::info!(
            "Attempt started: id={}, quiz={}, learner={}",
            attempt.id,
            attempt.quiz_id,
            attempt.learner_id
        );
        Ok(attempt)
    }

    pub async fn get_attempt(&self, attempt_id: &str) -> AttemptResult<Attempt> {
        track_store_operation(
            "find",
            self.store.backend_name(),
            self.store.find_by_id(attempt_id),
        )
        .await
    }

    pub async fn save_progress(
        &self,
        attempt_id: &str,
        update: &SaveProgressRequest,
    ) -> AttemptResult<SaveProgressResponse> {
        let result = self.try_save_progress(attempt_id, update).await;
        PROGRESS_SAVES_TOTAL
            .with_label_values(&[outcome_label(&result)])
            .inc();
        result
    }

    async fn try_save_progress(
        &self,
        attempt_id: &str,
        update: &SaveProgressRequest,
    ) -> AttemptResult<SaveProgressResponse> {
        update.validate()?;

        let (attempt, saved_at) = self
            .mutate(attempt_id, "save_progress", |attempt, now| {
                attempt.apply_progress(update, now)?;
                Ok(now)
            })
            .await?;

        tracing::debug!(
            "Progress saved: attempt={}, answers={}, index={}, remaining={}s, version={}",
            attempt.id,
            attempt.answers.len(),
            attempt.current_question_index,
            attempt.time_remaining_seconds,
            attempt.version
        );

        Ok(SaveProgressResponse {
            attempt_id: attempt.id.clone(),
            saved_at,
            version: attempt.version,
            server_time_remaining_seconds: attempt.server_time_remaining(saved_at),
        })
    }

    pub async fn record_violation(
        &self,
        attempt_id: &str,
        req: &RecordViolationRequest,
    ) -> AttemptResult<RecordViolationResponse> {
        req.validate()?;
        let kind = ViolationKind::from(req.violation_type.clone());

        let (attempt, recorded_at) = self
            .mutate(attempt_id, "record_violation", |attempt, now| {
                attempt.append_violation(kind.clone(), req.details.clone(), now)
            })
            .await?;

        VIOLATIONS_RECORDED_TOTAL
            .with_label_values(&[kind.metric_label()])
            .inc();
        tracing::warn!(
            "Violation recorded: attempt={}, learner={}, type={}, total={}",
            attempt.id,
            attempt.learner_id,
            kind.as_str(),
            attempt.violations.len()
        );

        if let Some(violation) = attempt.violations.last() {
            let event = ViolationEvent::new(&attempt, violation);
            if let Err(e) = self.publisher.publish(&event).await {
                tracing::warn!("Failed to publish violation event: {:#}", e);
            }
        }

        Ok(RecordViolationResponse {
            violation_count: attempt.violations.len(),
            recorded_at,
        })
    }

    pub async fn close_attempt(
        &self,
        attempt_id: &str,
        status: AttemptStatus,
    ) -> AttemptResult<Attempt> {
        if !status.is_terminal() {
            return Err(AttemptError::Validation(
                "attempt can only be closed with a terminal status".to_string(),
            ));
        }

        let (attempt, ()) = self
            .mutate(attempt_id, "close", |attempt, now| attempt.close(status, now))
            .await?;

        ATTEMPTS_CLOSED_TOTAL
            .with_label_values(&[status.as_str()])
            .inc();
        tracing::info!("Attempt closed: id={}, status={}", attempt.id, status);

        Ok(attempt)
    }

    /// Read-modify-write with a version check, retried on conflicts only.
    async fn mutate<F, R>(
        &self,
        attempt_id: &str,
        operation: &'static str,
        apply: F,
    ) -> AttemptResult<(Attempt, R)>
    where
        F: Fn(&mut Attempt, DateTime<Utc>) -> AttemptResult<R>,
    {
        let apply = &apply;
        retry_on(
            self.retry.clone(),
            |e: &AttemptError| {
                let conflict = matches!(e, AttemptError::Conflict(_));
                if conflict {
                    WRITE_CONFLICTS_TOTAL.with_label_values(&[operation]).inc();
                    tracing::debug!("Retrying {} on attempt {} after conflict", operation, attempt_id);
                }
                conflict
            },
            || self.mutate_once(attempt_id, apply),
        )
        .await
    }

    async fn mutate_once<F, R>(&self, attempt_id: &str, apply: &F) -> AttemptResult<(Attempt, R)>
    where
        F: Fn(&mut Attempt, DateTime<Utc>) -> AttemptResult<R>,
    {
        let backend = self.store.backend_name();
        let mut attempt =
            track_store_operation("find", backend, self.store.find_by_id(attempt_id)).await?;
        let expected_version = attempt.version;
        let now = self.clock.now();

        let outcome = apply(&mut attempt, now)?;
        attempt.version = expected_version + 1;
        attempt.updated_at = now;

        track_store_operation("save", backend, self.store.save(&attempt, expected_version))
            .await?;

        Ok((attempt, outcome))
    }
}

fn outcome_label<T>(result: &AttemptResult<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    }
}
