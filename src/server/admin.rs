//! Operator JSON routes under `/admin`

use axum::Json;
use axum::extract::{Path, Query, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use super::AppState;
use super::error::ApiError;
use crate::daemon::DispatchReport;
use crate::domain::{ParticipantStatus, ParticipantSummary};
use crate::error::DialrError;
use crate::scheduler::{DispatchMode, ScheduledTime, schedule as schedule_participant};
use crate::storage::Settings;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Rejects admin requests without the configured token
pub async fn require_admin_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(expected) = state.admin_token.as_deref() {
        let supplied = request
            .headers()
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        if supplied != Some(expected) {
            tracing::warn!(path = %request.uri().path(), "Admin request rejected");
            return ApiError::Unauthorized.into_response();
        }
    }
    next.run(request).await
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
}

pub async fn list_participants(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<ParticipantSummary>>, ApiError> {
    let status = match params.status.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(raw) => Some(
            ParticipantStatus::parse(raw).ok_or_else(|| DialrError::Validation(format!("unknown status: {}", raw)))?,
        ),
        None => None,
    };
    Ok(Json(state.ledger.summaries(status)?))
}

pub async fn settings(State(state): State<AppState>) -> Json<Settings> {
    Json(state.pause.load())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PauseResponse {
    pub paused: bool,
    pub was_paused: bool,
}

async fn set_paused(state: &AppState, paused: bool) -> Result<Json<PauseResponse>, ApiError> {
    let was_paused = state.pause.set_paused(paused)?;
    tracing::info!(paused = paused, was_paused = was_paused, "Dispatch pause switch set");
    Ok(Json(PauseResponse { paused, was_paused }))
}

pub async fn pause(State(state): State<AppState>) -> Result<Json<PauseResponse>, ApiError> {
    set_paused(&state, true).await
}

pub async fn resume(State(state): State<AppState>) -> Result<Json<PauseResponse>, ApiError> {
    set_paused(&state, false).await
}

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub participant_id: String,
    pub local_time: String,
}

pub async fn schedule(
    State(state): State<AppState>,
    Json(request): Json<ScheduleRequest>,
) -> Result<Json<ScheduledTime>, ApiError> {
    let scheduled = schedule_participant(&state.ledger, &request.participant_id, &request.local_time, state.timezone)?;
    Ok(Json(scheduled))
}

#[derive(Debug, Default, Deserialize)]
pub struct DialNowRequest {
    pub force: Option<bool>,
}

pub async fn dial_now(
    State(state): State<AppState>,
    request: Option<Json<DialNowRequest>>,
) -> Result<Json<DispatchReport>, ApiError> {
    let force = request.and_then(|Json(r)| r.force).unwrap_or(true);
    let mode = if force { DispatchMode::Force } else { DispatchMode::Normal };
    let report = state.dispatch.dispatch_now(mode).await?;
    Ok(Json(report))
}

#[derive(Debug, Default, Deserialize)]
pub struct RetryRequest {
    #[serde(default)]
    pub reset_attempts: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RetryResponse {
    pub participant_id: String,
    pub previous_status: ParticipantStatus,
    pub status: ParticipantStatus,
}

pub async fn retry(
    State(state): State<AppState>,
    Path(participant_id): Path<String>,
    request: Option<Json<RetryRequest>>,
) -> Result<Json<RetryResponse>, ApiError> {
    let reset_attempts = request.map(|Json(r)| r.reset_attempts).unwrap_or_default();
    let previous_status = state.ledger.retry(&participant_id, reset_attempts)?;
    tracing::info!(participant = %participant_id, from = %previous_status, reset_attempts = reset_attempts, "Participant reset for retry");
    Ok(Json(RetryResponse {
        participant_id,
        previous_status,
        status: ParticipantStatus::Pending,
    }))
}
