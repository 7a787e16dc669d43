//! Provider-facing routes: the voice flow and the two status webhooks.
//!
//! Webhooks answer 200 "ok" for anything they can safely drop (unknown call,
//! non-completed recording, guard refusal) and an error status only when a
//! redelivery could succeed.

use axum::Form;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use super::AppState;
use super::error::ApiError;
use crate::webhook::{RecordingEvent, RecordingOutcome, StatusEvent, TurnEvent, is_inbound};

fn twiml(xml: String) -> Response {
    ([(header::CONTENT_TYPE, "text/xml")], xml).into_response()
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn voice(State(state): State<AppState>) -> Response {
    twiml(state.voice.welcome())
}

pub async fn start(State(state): State<AppState>, Form(event): Form<TurnEvent>) -> Response {
    twiml(state.voice.start(is_inbound(event.direction.as_deref())))
}

#[derive(Debug, Deserialize)]
pub struct NextParams {
    #[serde(default)]
    pub q: usize,
}

pub async fn next(
    State(state): State<AppState>,
    Query(params): Query<NextParams>,
    Form(event): Form<TurnEvent>,
) -> Response {
    if let Some(speech) = event.speech_result.as_deref()
        && let Err(e) = state.ingestor.handle_turn(&event.call_sid, speech)
    {
        // Never break the live call over a bookkeeping failure
        tracing::error!(call_sid = %event.call_sid, error = %e, "Failed to record engagement");
    }
    twiml(state.voice.next(params.q, is_inbound(event.direction.as_deref())))
}

pub async fn call_status(
    State(state): State<AppState>,
    Form(event): Form<StatusEvent>,
) -> Result<&'static str, ApiError> {
    tracing::debug!(call_sid = %event.call_sid, status = %event.call_status, "Call status callback");
    state.ingestor.handle_status(&event.call_sid, &event.call_status)?;
    Ok("ok")
}

pub async fn recording_done(
    State(state): State<AppState>,
    Form(event): Form<RecordingEvent>,
) -> Result<&'static str, ApiError> {
    tracing::info!(
        call_sid = %event.call_sid,
        status = %event.recording_status.as_deref().unwrap_or("-"),
        "Recording callback"
    );
    let outcome = state.ingestor.handle_recording(&event).await?;
    if let RecordingOutcome::Accepted { participant_id, .. } = &outcome {
        tracing::info!(participant = %participant_id, call_sid = %event.call_sid, "Response accepted");
    }
    Ok("ok")
}
