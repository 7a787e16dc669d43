//! HTTP surface: voice flow, provider webhooks and the operator API.

pub mod admin;
pub mod error;
pub mod twiml;
pub mod voice;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use chrono_tz::Tz;
use log::info;

use crate::daemon::DispatchHandle;
use crate::error::Result;
use crate::storage::{ParticipantLedger, PauseSwitch};
use crate::webhook::WebhookIngestor;

pub use error::ApiError;
pub use twiml::{Questionnaire, VoiceFlow, xml_escape};

/// Shared state for every route
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<ParticipantLedger>,
    pub pause: PauseSwitch,
    pub ingestor: Arc<WebhookIngestor>,
    pub dispatch: DispatchHandle,
    pub voice: Arc<VoiceFlow>,
    /// Zone operator-entered schedule times are read in
    pub timezone: Tz,
    pub admin_token: Option<String>,
}

pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/admin/participants", get(admin::list_participants))
        .route("/admin/participants/:id/retry", post(admin::retry))
        .route("/admin/settings", get(admin::settings))
        .route("/admin/pause", post(admin::pause))
        .route("/admin/resume", post(admin::resume))
        .route("/admin/schedule", post(admin::schedule))
        .route("/admin/dial-now", post(admin::dial_now))
        .route_layer(middleware::from_fn_with_state(state.clone(), admin::require_admin_token));

    Router::new()
        .route("/health", get(voice::health))
        .route("/voice", post(voice::voice))
        .route("/start", post(voice::start))
        .route("/next", post(voice::next))
        .route("/call-status", post(voice::call_status))
        .route("/recording-done", post(voice::recording_done))
        .merge(admin)
        .with_state(state)
}

/// Bind and serve until the process is stopped
pub async fn serve(bind: &str, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
