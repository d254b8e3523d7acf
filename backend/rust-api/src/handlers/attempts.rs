use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::{
    errors::AttemptError,
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::{
        Attempt, AttemptStatus, CloseAttemptRequest, RecordViolationRequest, SaveProgressRequest,
        StartAttemptRequest,
    },
    services::{attempt_service::AttemptService, AppState},
};

#[derive(Clone, Copy)]
enum Access {
    Read,
    Write,
}

/// Loads the attempt and checks the caller may touch it. Learners only reach
/// their own attempts; staff may read any attempt but never write answers or
/// violations on a learner's behalf.
async fn authorized_attempt(
    service: &AttemptService,
    claims: &JwtClaims,
    attempt_id: &str,
    access: Access,
) -> Result<Attempt, AttemptError> {
    let attempt = service.get_attempt(attempt_id).await?;
    let owner = attempt.learner_id == claims.sub;
    let allowed = match access {
        Access::Read => owner || claims.is_staff(),
        Access::Write => owner,
    };
    if !allowed {
        tracing::warn!(
            "User {} (role: {}) denied access to attempt {}",
            claims.sub,
            claims.role,
            attempt_id
        );
        return Err(AttemptError::Forbidden(format!(
            "attempt {} belongs to another learner",
            attempt_id
        )));
    }
    Ok(attempt)
}

pub async fn start_attempt(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<StartAttemptRequest>,
) -> Result<impl IntoResponse, AttemptError> {
    tracing::info!(
        "Starting attempt for learner_id={}, quiz_id={}",
        req.learner_id,
        req.quiz_id
    );

    req.validate()?;
    if req.learner_id != claims.sub && !claims.is_staff() {
        return Err(AttemptError::Forbidden(
            "learners can only start their own attempts".to_string(),
        ));
    }

    let attempt = state.attempt_service().start_attempt(&req).await?;
    Ok((StatusCode::CREATED, Json(attempt)))
}

pub async fn get_attempt(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(attempt_id): Path<String>,
) -> Result<impl IntoResponse, AttemptError> {
    tracing::debug!("Getting attempt: {}", attempt_id);

    let service = state.attempt_service();
    let attempt = authorized_attempt(&service, &claims, &attempt_id, Access::Read).await?;
    Ok(Json(attempt))
}

pub async fn save_progress(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(attempt_id): Path<String>,
    AppJson(req): AppJson<SaveProgressRequest>,
) -> Result<impl IntoResponse, AttemptError> {
    tracing::debug!("Autosave for attempt: {}", attempt_id);

    req.validate()?;
    let service = state.attempt_service();
    authorized_attempt(&service, &claims, &attempt_id, Access::Write).await?;

    let response = service.save_progress(&attempt_id, &req).await?;
    Ok(Json(response))
}

pub async fn record_violation(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(attempt_id): Path<String>,
    AppJson(req): AppJson<RecordViolationRequest>,
) -> Result<impl IntoResponse, AttemptError> {
    tracing::info!(
        "Recording violation '{}' for attempt: {}",
        req.violation_type,
        attempt_id
    );

    req.validate()?;
    let service = state.attempt_service();
    authorized_attempt(&service, &claims, &attempt_id, Access::Write).await?;

    let response = service.record_violation(&attempt_id, &req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn close_attempt(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(attempt_id): Path<String>,
    AppJson(req): AppJson<CloseAttemptRequest>,
) -> Result<impl IntoResponse, AttemptError> {
    tracing::info!("Closing attempt {} as {}", attempt_id, req.status);

    if !req.status.is_terminal() {
        return Err(AttemptError::Validation(format!(
            "attempt can only be closed with a terminal status, got {}",
            req.status
        )));
    }

    let service = state.attempt_service();
    let attempt = authorized_attempt(&service, &claims, &attempt_id, Access::Read).await?;

    // Learners may only hand in their own attempt; other outcomes are staff decisions.
    if !claims.is_staff()
        && (attempt.learner_id != claims.sub || req.status != AttemptStatus::Submitted)
    {
        return Err(AttemptError::Forbidden(format!(
            "only staff can close an attempt as {}",
            req.status
        )));
    }

    let closed = service.close_attempt(&attempt_id, req.status).await?;
    Ok(Json(closed))
}
