//! In-memory telephony provider

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{CallRequest, TelephonyProvider};
use crate::error::{DialrError, Result};

/// Records every call request and hands out sequential session ids.
#[derive(Default)]
pub struct MockTelephonyProvider {
    placed: Mutex<Vec<CallRequest>>,
    failing_numbers: HashSet<String>,
    recording: Option<Vec<u8>>,
    fail_downloads: bool,
}

impl MockTelephonyProvider {
    pub fn new() -> Self {
        Self {
            recording: Some(b"RIFF0000WAVE".to_vec()),
            ..Default::default()
        }
    }

    /// Reject calls to this number
    pub fn with_failing_number(mut self, number: &str) -> Self {
        self.failing_numbers.insert(number.to_string());
        self
    }

    /// Bytes written by `fetch_recording`
    pub fn with_recording(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.recording = Some(bytes.into());
        self
    }

    /// Make every recording download fail
    pub fn with_failing_downloads(mut self) -> Self {
        self.fail_downloads = true;
        self
    }

    /// Calls placed so far, in order
    pub fn placed_calls(&self) -> Vec<CallRequest> {
        self.placed.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TelephonyProvider for MockTelephonyProvider {
    async fn place_call(&self, request: &CallRequest) -> Result<String> {
        if self.failing_numbers.contains(&request.to) {
            return Err(DialrError::Telephony("mock provider rejected the number".to_string()));
        }
        let mut placed = self.placed.lock().map_err(|e| DialrError::Telephony(e.to_string()))?;
        placed.push(request.clone());
        Ok(format!("CA-mock-{}", placed.len()))
    }

    async fn fetch_recording(&self, _recording_url: &str, dest: &Path) -> Result<()> {
        if self.fail_downloads {
            return Err(DialrError::Telephony("mock recording download failed".to_string()));
        }
        let bytes = self.recording.clone().unwrap_or_default();
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, bytes).await?;
        Ok(())
    }
}
