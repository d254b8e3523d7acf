use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::{Validate, ValidationError};

use crate::errors::AttemptError;

pub const MAX_VIOLATION_TYPE_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Submitted,
    Graded,
    Expired,
    Terminated,
}

impl AttemptStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Submitted => "submitted",
            AttemptStatus::Graded => "graded",
            AttemptStatus::Expired => "expired",
            AttemptStatus::Terminated => "terminated",
        }
    }

    pub fn is_terminal(self) -> bool {
        self != AttemptStatus::InProgress
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Integrity event kinds reported by the quiz client.
///
/// Unknown labels are kept verbatim in `Other` so newer clients can report
/// kinds this service does not know about yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ViolationKind {
    TabSwitch,
    FullscreenExit,
    CopyPaste,
    WindowBlur,
    RightClick,
    DevtoolsOpen,
    ScreenshotAttempt,
    Other(String),
}

impl ViolationKind {
    pub fn as_str(&self) -> &str {
        match self {
            ViolationKind::TabSwitch => "tab_switch",
            ViolationKind::FullscreenExit => "fullscreen_exit",
            ViolationKind::CopyPaste => "copy_paste",
            ViolationKind::WindowBlur => "window_blur",
            ViolationKind::RightClick => "right_click",
            ViolationKind::DevtoolsOpen => "devtools_open",
            ViolationKind::ScreenshotAttempt => "screenshot_attempt",
            ViolationKind::Other(label) => label,
        }
    }

    /// Metrics label; free-form kinds collapse into one bucket.
    pub fn metric_label(&self) -> &str {
        match self {
            ViolationKind::Other(_) => "other",
            known => known.as_str(),
        }
    }
}

impl From<String> for ViolationKind {
    fn from(value: String) -> Self {
        match value.trim() {
            "tab_switch" => ViolationKind::TabSwitch,
            "fullscreen_exit" => ViolationKind::FullscreenExit,
            "copy_paste" => ViolationKind::CopyPaste,
            "window_blur" => ViolationKind::WindowBlur,
            "right_click" => ViolationKind::RightClick,
            "devtools_open" => ViolationKind::DevtoolsOpen,
            "screenshot_attempt" => ViolationKind::ScreenshotAttempt,
            other => ViolationKind::Other(other.to_string()),
        }
    }
}

impl From<ViolationKind> for String {
    fn from(kind: ViolationKind) -> Self {
        kind.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    #[serde(rename = "type")]
    pub kind: ViolationKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// One learner's run through one quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: String,
    pub quiz_id: String,
    pub learner_id: String,
    pub status: AttemptStatus,
    #[serde(default)]
    pub answers: BTreeMap<String, Value>,
    pub current_question_index: u32,
    pub time_remaining_seconds: u32,
    #[serde(default)]
    pub violations: Vec<Violation>,
    pub question_count: Option<u32>,
    pub time_limit_seconds: Option<u32>,
    /// `started_at + time_limit_seconds`; fixed at creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_at: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_saved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl Attempt {
    pub fn new(req: &StartAttemptRequest, id: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            quiz_id: req.quiz_id.clone(),
            learner_id: req.learner_id.clone(),
            status: AttemptStatus::InProgress,
            answers: BTreeMap::new(),
            current_question_index: 0,
            time_remaining_seconds: req.time_limit_seconds.unwrap_or(0),
            violations: Vec::new(),
            question_count: req.question_count,
            time_limit_seconds: req.time_limit_seconds,
            deadline_at: req
                .time_limit_seconds
                .map(|limit| now + Duration::seconds(i64::from(limit))),
            started_at: now,
            updated_at: now,
            last_saved_at: None,
            closed_at: None,
            version: 1,
        }
    }

    /// Every mutation goes through this gate first.
    pub fn ensure_in_progress(&self) -> Result<(), AttemptError> {
        if self.status.is_terminal() {
            return Err(AttemptError::InvalidState {
                id: self.id.clone(),
                status: self.status,
            });
        }
        Ok(())
    }

    /// Merges a partial progress update. Fields absent from `update` are left
    /// untouched; answers are merged per question.
    pub fn apply_progress(
        &mut self,
        update: &SaveProgressRequest,
        now: DateTime<Utc>,
    ) -> Result<(), AttemptError> {
        self.ensure_in_progress()?;

        if let (Some(index), Some(count)) = (update.current_question_index, self.question_count) {
            if index >= count {
                return Err(AttemptError::Validation(format!(
                    "current_question_index {} is out of range for a quiz of {} questions",
                    index, count
                )));
            }
        }

        if let Some(answers) = &update.answers {
            for (question_id, value) in answers {
                self.answers.insert(question_id.clone(), value.clone());
            }
        }
        if let Some(index) = update.current_question_index {
            self.current_question_index = index;
        }
        if let Some(reported) = update.time_remaining_seconds {
            self.time_remaining_seconds = self.bounded_time_remaining(reported);
        }
        self.last_saved_at = Some(now);

        Ok(())
    }

    /// Client-reported remaining time never exceeds the attempt's limit. The
    /// stored value depends only on the report, so replayed saves store the same.
    pub fn bounded_time_remaining(&self, reported: u32) -> u32 {
        match self.time_limit_seconds {
            Some(limit) => reported.min(limit),
            None => reported,
        }
    }

    /// Seconds left before `deadline_at` by the server clock, saturating at zero.
    pub fn server_time_remaining(&self, now: DateTime<Utc>) -> Option<u32> {
        self.deadline_at.map(|deadline| {
            let left = (deadline - now).num_seconds().max(0);
            u32::try_from(left).unwrap_or(u32::MAX)
        })
    }

    /// Appends to the violation log. The returned timestamp never precedes the
    /// previous entry, even if the wall clock stepped backwards.
    pub fn append_violation(
        &mut self,
        kind: ViolationKind,
        details: Option<Value>,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, AttemptError> {
        self.ensure_in_progress()?;

        let timestamp = match self.violations.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };
        self.violations.push(Violation {
            kind,
            timestamp,
            details,
        });

        Ok(timestamp)
    }

    pub fn close(&mut self, status: AttemptStatus, now: DateTime<Utc>) -> Result<(), AttemptError> {
        self.ensure_in_progress()?;
        if !status.is_terminal() {
            return Err(AttemptError::Validation(
                "attempt can only be closed with a terminal status".to_string(),
            ));
        }
        self.status = status;
        self.closed_at = Some(now);
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StartAttemptRequest {
    #[validate(length(min = 1, max = 128, message = "quiz_id must be 1-128 characters"))]
    pub quiz_id: String,
    #[validate(length(min = 1, max = 128, message = "learner_id must be 1-128 characters"))]
    pub learner_id: String,
    #[validate(range(min = 1, message = "question_count must be positive"))]
    pub question_count: Option<u32>,
    #[validate(range(min = 1, message = "time_limit_seconds must be positive"))]
    pub time_limit_seconds: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "validate_progress_update"))]
pub struct SaveProgressRequest {
    pub answers: Option<BTreeMap<String, Value>>,
    pub current_question_index: Option<u32>,
    pub time_remaining_seconds: Option<u32>,
}

impl SaveProgressRequest {
    pub fn is_empty(&self) -> bool {
        self.answers.is_none()
            && self.current_question_index.is_none()
            && self.time_remaining_seconds.is_none()
    }
}

fn validate_progress_update(update: &SaveProgressRequest) -> Result<(), ValidationError> {
    if update.is_empty() {
        let mut err = ValidationError::new("empty_update");
        err.message = Some(
            "at least one of answers, current_question_index, time_remaining_seconds is required"
                .into(),
        );
        return Err(err);
    }
    if let Some(answers) = &update.answers {
        if answers.keys().any(|key| key.trim().is_empty()) {
            let mut err = ValidationError::new("empty_question_id");
            err.message = Some("answer keys must be non-empty question ids".into());
            return Err(err);
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecordViolationRequest {
    /// Missing `type` deserializes as empty so it fails validation instead of parsing.
    #[serde(rename = "type", default)]
    #[validate(custom(function = "validate_violation_type"))]
    pub violation_type: String,
    pub details: Option<Value>,
}

fn validate_violation_type(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        let mut err = ValidationError::new("empty_violation_type");
        err.message = Some("violation type must not be empty".into());
        return Err(err);
    }
    if trimmed.chars().count() > MAX_VIOLATION_TYPE_LEN {
        let mut err = ValidationError::new("violation_type_too_long");
        err.message = Some(format!(
            "violation type must be at most {} characters",
            MAX_VIOLATION_TYPE_LEN
        )
        .into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloseAttemptRequest {
    pub status: AttemptStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SaveProgressResponse {
    pub attempt_id: String,
    pub saved_at: DateTime<Utc>,
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_time_remaining_seconds: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordViolationResponse {
    pub violation_count: usize,
    pub recorded_at: DateTime<Utc>,
}
