use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};

use crate::models::{Attempt, Violation};

pub const VIOLATIONS_CHANNEL: &str = "attempt-violations";

/// Published after a violation is stored, for whoever owns escalation policy
/// (auto-submit after N violations and the like).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationEvent {
    pub attempt_id: String,
    pub quiz_id: String,
    pub learner_id: String,
    pub violation_type: String,
    pub violation_count: usize,
    pub recorded_at: DateTime<Utc>,
}

impl ViolationEvent {
    pub fn new(attempt: &Attempt, violation: &Violation) -> Self {
        Self {
            attempt_id: attempt.id.clone(),
            quiz_id: attempt.quiz_id.clone(),
            learner_id: attempt.learner_id.clone(),
            violation_type: violation.kind.as_str().to_string(),
            violation_count: attempt.violations.len(),
            recorded_at: violation.timestamp,
        }
    }
}

#[derive(Clone)]
pub struct ViolationPublisher {
    redis: Option<ConnectionManager>,
}

impl ViolationPublisher {
    pub fn new(redis: Option<ConnectionManager>) -> Self {
        Self { redis }
    }

    pub fn disabled() -> Self {
        Self { redis: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.redis.is_some()
    }

    pub async fn publish(&self, event: &ViolationEvent) -> Result<()> {
        let Some(redis) = &self.redis else {
            tracing::debug!(
                "Violation feed disabled, not publishing event for attempt {}",
                event.attempt_id
            );
            return Ok(());
        };

        let mut conn = redis.clone();
        let payload =
            serde_json::to_string(event).context("Failed to serialize violation event")?;

        let _: () = redis::cmd("PUBLISH")
            .arg(VIOLATIONS_CHANNEL)
            .arg(&payload)
            .query_async(&mut conn)
            .await
            .context("Failed to publish violation event to Redis Pub/Sub")?;

        tracing::info!(
            "Violation event published: channel={}, attempt={}, count={}",
            VIOLATIONS_CHANNEL,
            event.attempt_id,
            event.violation_count
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{StartAttemptRequest, ViolationKind};

    #[tokio::test]
    async fn disabled_publisher_is_a_no_op() {
        let req = StartAttemptRequest {
            quiz_id: "quiz-1".to_string(),
            learner_id: "learner-1".to_string(),
            question_count: None,
            time_limit_seconds: None,
        };
        let mut attempt = Attempt::new(&req, "a1".to_string(), Utc::now());
        attempt
            .append_violation(ViolationKind::DevtoolsOpen, None, Utc::now())
            .unwrap();

        let event = ViolationEvent::new(&attempt, &attempt.violations[0]);
        assert_eq!(event.violation_type, "devtools_open");
        assert_eq!(event.violation_count, 1);

        let publisher = ViolationPublisher::disabled();
        assert!(!publisher.is_enabled());
        publisher.publish(&event).await.unwrap();
    }
}
