//! Provider callback payloads (form-encoded)

use serde::Deserialize;

/// `POST /call-status`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusEvent {
    #[serde(rename = "CallSid", default)]
    pub call_sid: String,
    #[serde(rename = "CallStatus", default)]
    pub call_status: String,
}

/// `POST /next` (one answered question)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TurnEvent {
    #[serde(rename = "CallSid", default)]
    pub call_sid: String,
    #[serde(rename = "SpeechResult", default)]
    pub speech_result: Option<String>,
    #[serde(rename = "Direction", default)]
    pub direction: Option<String>,
}

/// `POST /recording-done`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordingEvent {
    #[serde(rename = "CallSid", default)]
    pub call_sid: String,
    #[serde(rename = "RecordingUrl", default)]
    pub recording_url: Option<String>,
    #[serde(rename = "RecordingStatus", default)]
    pub recording_status: Option<String>,
    #[serde(rename = "Direction", default)]
    pub direction: Option<String>,
}

impl RecordingEvent {
    /// An absent status is treated as completed
    pub fn is_completed(&self) -> bool {
        self.recording_status
            .as_deref()
            .map(|s| s.trim().to_ascii_lowercase())
            .is_none_or(|s| s.is_empty() || s == "completed")
    }
}

/// Inbound calls start their own recording from the voice flow
pub fn is_inbound(direction: Option<&str>) -> bool {
    direction.is_some_and(|d| d.trim().to_ascii_lowercase().starts_with("inbound"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_event_from_provider_json() {
        let event: RecordingEvent = serde_json::from_value(serde_json::json!({
            "CallSid": "CA1",
            "RecordingUrl": "https://api.twilio.com/Recordings/RE1",
            "RecordingStatus": "completed",
            "Direction": "outbound-api",
            "AccountSid": "AC123"
        }))
        .unwrap();
        assert_eq!(event.call_sid, "CA1");
        assert!(event.is_completed());
    }

    #[test]
    fn test_recording_status_variants() {
        let mut event = RecordingEvent::default();
        assert!(event.is_completed());
        event.recording_status = Some("Completed".to_string());
        assert!(event.is_completed());
        event.recording_status = Some("absent".to_string());
        assert!(!event.is_completed());
    }

    #[test]
    fn test_is_inbound() {
        assert!(is_inbound(Some("inbound")));
        assert!(!is_inbound(Some("outbound-api")));
        assert!(!is_inbound(None));
    }
}
