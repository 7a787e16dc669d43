//! Participant record and its lifecycle transitions
//!
//! A participant moves between `pending` and `in_progress` once per dispatched
//! call, for up to `max_attempts` calls, and ends in one of two sinks:
//! `completed` (a response was accepted) or `failed` (retry budget exhausted).
//! Sinks are never left except through an explicit administrative retry.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::outcome::CallOutcome;
use crate::error::{DialrError, Result};
use crate::id::format_utc;

/// Default cap on dispatched calls per participant
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default minimum time between two calls to the same participant
pub const DEFAULT_RETRY_GAP_SECS: i64 = 3600;

/// Fields every current-schema participant record carries.
///
/// Records missing any of these are back-filled on load and the ledger is
/// re-persisted once.
pub const SCHEMA_FIELDS: &[&str] = &[
    "phone",
    "status",
    "attempts",
    "last_call_time",
    "last_call_session_id",
    "last_call_status",
    "engaged",
    "last_recording_url",
    "last_outputs",
    "scheduled_time_local",
    "scheduled_time_utc",
];

/// Attempt cap and spacing applied to every participant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_gap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_gap: Duration::seconds(DEFAULT_RETRY_GAP_SECS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, retry_gap: Duration) -> Self {
        Self {
            max_attempts,
            retry_gap,
        }
    }
}

/// Lifecycle status of a participant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    /// Waiting for a (re)dial
    #[default]
    Pending,
    /// A call has been placed and not yet resolved
    #[serde(alias = "in-progress")]
    InProgress,
    /// A response was accepted
    Completed,
    /// Retry budget exhausted
    Failed,
}

impl ParticipantStatus {
    /// Returns true for the two sink states
    pub fn is_terminal(&self) -> bool {
        matches!(self, ParticipantStatus::Completed | ParticipantStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantStatus::Pending => "pending",
            ParticipantStatus::InProgress => "in_progress",
            ParticipantStatus::Completed => "completed",
            ParticipantStatus::Failed => "failed",
        }
    }

    /// Parse a user-supplied status filter
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(ParticipantStatus::Pending),
            "in_progress" | "in-progress" => Some(ParticipantStatus::InProgress),
            "completed" => Some(ParticipantStatus::Completed),
            "failed" => Some(ParticipantStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Files produced for an accepted response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseArtifacts {
    pub audio_path: String,
    pub transcript_path: String,
    pub translation_path: String,
    pub english_audio_path: String,
}

impl ResponseArtifacts {
    /// Flatten into the free-form map stored in `last_outputs`
    pub fn to_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("audio_path".to_string(), self.audio_path.clone()),
            ("transcript_path".to_string(), self.transcript_path.clone()),
            ("translation_path".to_string(), self.translation_path.clone()),
            ("english_audio_path".to_string(), self.english_audio_path.clone()),
        ])
    }
}

/// What a status callback did to a participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChange {
    /// Status moved (or was confirmed) to `to`
    Applied { from: ParticipantStatus, to: ParticipantStatus },
    /// Provider said "completed" but nobody engaged; sent back for retry
    DowngradedUnengaged,
    /// Participant already in a sink state; nothing touched
    IgnoredTerminal(ParticipantStatus),
    /// Provider status we don't map; nothing touched
    Unrecognized(String),
}

/// One survey subject
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Participant {
    /// Contact address (E.164). Never log this unmasked.
    #[serde(alias = "phone_e164")]
    pub phone: String,

    pub status: ParticipantStatus,

    /// Calls dispatched so far; bumped exactly once per placed call
    pub attempts: u32,

    //=== Most recent dispatched call ===
    pub last_call_time: Option<String>,
    #[serde(alias = "last_call_sid")]
    pub last_call_session_id: Option<String>,
    /// Raw provider status of the most recent call
    pub last_call_status: Option<String>,

    /// Real speech observed during the current attempt
    pub engaged: bool,

    //=== Accepted response ===
    pub last_recording_url: Option<String>,
    pub last_outputs: BTreeMap<String, String>,

    //=== Schedule ===
    pub scheduled_time_local: Option<String>,
    pub scheduled_time_utc: Option<String>,

    /// Fields written by other tools; preserved verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Participant {
    /// Create a freshly imported participant
    pub fn new(phone: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            ..Default::default()
        }
    }

    /// Masked contact address, safe for logs and listings
    pub fn masked_phone(&self) -> String {
        mask_phone(&self.phone)
    }

    /// No more calls may be placed under this policy
    pub fn is_exhausted(&self, policy: &RetryPolicy) -> bool {
        self.attempts >= policy.max_attempts
    }

    fn ensure_not_terminal(&self, action: &str) -> Result<()> {
        if self.status.is_terminal() {
            return Err(DialrError::InvalidState(format!(
                "cannot {} a participant that is {}",
                action, self.status
            )));
        }
        Ok(())
    }

    /// Record a call the provider accepted.
    ///
    /// Starts a new attempt: engagement and the previous call's provider status
    /// are cleared.
    pub fn mark_call_started(&mut self, session_id: &str, now: DateTime<Utc>, policy: &RetryPolicy) -> Result<()> {
        self.ensure_not_terminal("start a call for")?;
        if self.is_exhausted(policy) {
            return Err(DialrError::InvalidState(format!(
                "attempt cap reached ({}/{})",
                self.attempts, policy.max_attempts
            )));
        }

        self.status = ParticipantStatus::InProgress;
        self.attempts += 1;
        self.last_call_time = Some(format_utc(now));
        self.last_call_session_id = Some(session_id.to_string());
        self.last_call_status = None;
        self.engaged = false;
        Ok(())
    }

    /// Note a live utterance. Returns true if this flipped `engaged`.
    pub fn mark_engaged(&mut self) -> bool {
        if self.status.is_terminal() || self.engaged {
            return false;
        }
        self.engaged = true;
        true
    }

    /// Apply a provider status callback
    pub fn apply_call_status(&mut self, outcome: &CallOutcome, policy: &RetryPolicy) -> StatusChange {
        if self.status.is_terminal() {
            return StatusChange::IgnoredTerminal(self.status);
        }
        if let CallOutcome::Unrecognized(raw) = outcome {
            return StatusChange::Unrecognized(raw.clone());
        }

        let from = self.status;
        self.last_call_status = Some(outcome.as_str().to_string());

        if outcome.is_retryable_failure() {
            self.status = if self.is_exhausted(policy) {
                ParticipantStatus::Failed
            } else {
                ParticipantStatus::Pending
            };
            return StatusChange::Applied { from, to: self.status };
        }

        if *outcome == CallOutcome::Completed && !self.engaged {
            self.status = ParticipantStatus::Pending;
            return StatusChange::DowngradedUnengaged;
        }

        // Completed-and-engaged stays in progress until the recording is accepted
        self.status = ParticipantStatus::InProgress;
        StatusChange::Applied { from, to: self.status }
    }

    /// Accept a response
    pub fn mark_completed(&mut self, recording_url: &str, artifacts: &ResponseArtifacts) -> Result<()> {
        self.ensure_not_terminal("complete")?;
        self.status = ParticipantStatus::Completed;
        self.last_recording_url = Some(recording_url.to_string());
        self.last_outputs = artifacts.to_map();
        Ok(())
    }

    /// Store a new dispatch target.
    ///
    /// Status is left alone: a pending participant stays pending, and a call
    /// in progress keeps the participant out of dispatch until it resolves.
    pub fn set_schedule(&mut self, local: String, utc: String) -> Result<()> {
        self.ensure_not_terminal("schedule")?;
        self.scheduled_time_local = Some(local);
        self.scheduled_time_utc = Some(utc);
        Ok(())
    }

    /// Resolve a call whose outcome never arrived
    pub fn release_stale(&mut self, policy: &RetryPolicy) -> ParticipantStatus {
        if self.status == ParticipantStatus::InProgress {
            self.status = if self.is_exhausted(policy) {
                ParticipantStatus::Failed
            } else {
                ParticipantStatus::Pending
            };
        }
        self.status
    }

    /// Administrative retry; the only way out of a sink state
    pub fn reset_for_retry(&mut self, reset_attempts: bool) {
        self.status = ParticipantStatus::Pending;
        self.engaged = false;
        if reset_attempts {
            self.attempts = 0;
        }
    }
}

/// Mask a phone number, keeping a leading `+` and the last four digits.
///
/// `+15551234567` becomes `+*******4567`. Anything with four or fewer
/// digits is fully masked.
pub fn mask_phone(phone: &str) -> String {
    let trimmed = phone.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let (prefix, rest) = match trimmed.strip_prefix('+') {
        Some(rest) => ("+", rest),
        None => ("", trimmed),
    };
    let chars: Vec<char> = rest.chars().collect();
    if chars.len() <= 4 {
        return format!("{}{}", prefix, "*".repeat(chars.len().max(4)));
    }

    let keep_from = chars.len() - 4;
    let masked: String = chars
        .iter()
        .enumerate()
        .map(|(i, c)| if i < keep_from { '*' } else { *c })
        .collect();
    format!("{}{}", prefix, masked)
}

/// Read-only listing row; the contact address is masked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantSummary {
    pub id: String,
    pub phone: String,
    pub status: ParticipantStatus,
    pub attempts: u32,
    pub engaged: bool,
    pub scheduled_time_local: Option<String>,
    pub last_call_time: Option<String>,
    pub last_call_status: Option<String>,
}

impl ParticipantSummary {
    pub fn from_participant(id: &str, participant: &Participant) -> Self {
        Self {
            id: id.to_string(),
            phone: participant.masked_phone(),
            status: participant.status,
            attempts: participant.attempts,
            engaged: participant.engaged,
            scheduled_time_local: participant.scheduled_time_local.clone(),
            last_call_time: participant.last_call_time.clone(),
            last_call_status: participant.last_call_status.clone(),
        }
    }
}
