//! Telephony provider boundary.
//!
//! - `TelephonyProvider`: place an outbound call, fetch a finished recording
//! - `TwilioProvider`: REST implementation over reqwest
//! - `MockTelephonyProvider`: in-memory provider for tests and dry runs

pub mod mock;
pub mod twilio;

use std::path::Path;

use async_trait::async_trait;

use crate::domain::CallOutcome;
use crate::error::Result;

pub use mock::MockTelephonyProvider;
pub use twilio::TwilioProvider;

/// Everything the provider needs to place one survey call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub to: String,
    pub from: String,
    /// Voice-menu entry point
    pub voice_url: String,
    /// Record the full call
    pub record: bool,
    pub recording_callback_url: String,
    pub status_callback_url: String,
    pub status_events: Vec<String>,
}

impl CallRequest {
    /// Build a request whose callbacks all point at `public_base_url`
    pub fn new(to: impl Into<String>, from: impl Into<String>, public_base_url: &str) -> Self {
        let base = public_base_url.trim_end_matches('/');
        Self {
            to: to.into(),
            from: from.into(),
            voice_url: format!("{}/voice", base),
            record: true,
            recording_callback_url: format!("{}/recording-done", base),
            status_callback_url: format!("{}/call-status", base),
            status_events: CallOutcome::subscribed_events().iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Outbound telephony provider
#[async_trait]
pub trait TelephonyProvider: Send + Sync {
    /// Place a call; returns the provider's call session id
    async fn place_call(&self, request: &CallRequest) -> Result<String>;

    /// Download a finished recording to `dest`
    async fn fetch_recording(&self, recording_url: &str, dest: &Path) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_request_urls() {
        let request = CallRequest::new("+15551234567", "+15550000000", "https://survey.example.org/");
        assert_eq!(request.voice_url, "https://survey.example.org/voice");
        assert_eq!(request.recording_callback_url, "https://survey.example.org/recording-done");
        assert_eq!(request.status_callback_url, "https://survey.example.org/call-status");
        assert!(request.record);
    }

    #[test]
    fn test_call_request_subscribes_to_outcomes() {
        let request = CallRequest::new("+15551234567", "+15550000000", "https://x");
        assert_eq!(
            request.status_events,
            vec!["completed", "no-answer", "busy", "failed", "canceled"]
        );
    }
}
