//! Twilio REST client

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Client, Url};
use serde::Deserialize;

use super::{CallRequest, TelephonyProvider};
use crate::config::TelephonyConfig;
use crate::domain::mask_phone;
use crate::error::{DialrError, Result};

/// Subset of the call resource we read back
#[derive(Debug, Deserialize)]
struct CallResource {
    sid: String,
}

/// Twilio REST provider
pub struct TwilioProvider {
    client: Client,
    api_base_url: String,
    /// Only URLs on this origin receive the account credentials
    api_origin: Url,
    account_sid: String,
    auth_token: String,
    recording_timeout: Duration,
}

impl TwilioProvider {
    /// Create a provider from config; credentials must be present
    pub fn from_config(config: &TelephonyConfig) -> Result<Self> {
        let account_sid = config
            .account_sid
            .clone()
            .ok_or_else(|| DialrError::Config("TWILIO_ACCOUNT_SID not set".to_string()))?;
        let auth_token = config
            .auth_token
            .clone()
            .ok_or_else(|| DialrError::Config("TWILIO_AUTH_TOKEN not set".to_string()))?;

        let api_origin = Url::parse(&config.api_base_url)
            .map_err(|e| DialrError::Config(format!("Invalid api_base_url {}: {}", config.api_base_url, e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| DialrError::Telephony(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_origin,
            account_sid,
            auth_token,
            recording_timeout: Duration::from_secs(config.recording_timeout_secs),
        })
    }

    fn calls_url(&self) -> String {
        format!("{}/2010-04-01/Accounts/{}/Calls.json", self.api_base_url, self.account_sid)
    }

    /// Parse a recording URL, refusing hosts other than the API's
    fn recording_download_url(&self, recording_url: &str) -> Result<Url> {
        let url = Url::parse(&recording_media_url(recording_url))
            .map_err(|e| DialrError::Validation(format!("Invalid RecordingUrl: {}", e)))?;
        let same_origin = url.scheme() == self.api_origin.scheme()
            && url.host_str() == self.api_origin.host_str()
            && url.port_or_known_default() == self.api_origin.port_or_known_default();
        if !same_origin {
            return Err(DialrError::Validation(format!(
                "RecordingUrl host {} is not the provider API host",
                url.host_str().unwrap_or("<none>")
            )));
        }
        Ok(url)
    }

    /// Form body for the create-call request
    fn form_params(request: &CallRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("To", request.to.clone()),
            ("From", request.from.clone()),
            ("Url", request.voice_url.clone()),
            ("Method", "POST".to_string()),
            ("Record", request.record.to_string()),
            ("RecordingStatusCallback", request.recording_callback_url.clone()),
            ("RecordingStatusCallbackMethod", "POST".to_string()),
            ("StatusCallback", request.status_callback_url.clone()),
            ("StatusCallbackMethod", "POST".to_string()),
        ];
        for event in &request.status_events {
            params.push(("StatusCallbackEvent", event.clone()));
        }
        params
    }
}

/// Recording URLs come without an extension; ask for WAV
fn recording_media_url(recording_url: &str) -> String {
    if recording_url.ends_with(".wav") {
        recording_url.to_string()
    } else {
        format!("{}.wav", recording_url)
    }
}

#[async_trait]
impl TelephonyProvider for TwilioProvider {
    async fn place_call(&self, request: &CallRequest) -> Result<String> {
        debug!("Placing call to {}", mask_phone(&request.to));

        let response = self
            .client
            .post(self.calls_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&Self::form_params(request))
            .send()
            .await
            .map_err(|e| DialrError::Telephony(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DialrError::Telephony(format!("API error {}: {}", status, error_body)));
        }

        let call: CallResource = response
            .json()
            .await
            .map_err(|e| DialrError::Telephony(format!("Failed to parse response: {}", e)))?;

        info!("Call placed to {}: {}", mask_phone(&request.to), call.sid);
        Ok(call.sid)
    }

    async fn fetch_recording(&self, recording_url: &str, dest: &Path) -> Result<()> {
        let url = self.recording_download_url(recording_url)?;

        let response = self
            .client
            .get(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .timeout(self.recording_timeout)
            .send()
            .await
            .map_err(|e| DialrError::Telephony(format!("Recording download failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DialrError::Telephony(format!("Recording download returned {}", status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| DialrError::Telephony(format!("Recording download interrupted: {}", e)))?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &bytes).await?;

        debug!("Saved {} byte recording to {}", bytes.len(), dest.display());
        Ok(())
    }
}
