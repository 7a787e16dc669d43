//! Provider call outcome types.
//!
//! The telephony provider reports call progress as free-form strings. They are
//! parsed once, at the webhook boundary, into [`CallOutcome`]; anything the
//! provider adds later lands in [`CallOutcome::Unrecognized`] and is logged
//! rather than silently matched against the wrong branch.

use std::fmt;

/// Call progress as reported by the provider's status callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Initiated,
    Ringing,
    Answered,
    InProgress,
    Completed,
    NoAnswer,
    Busy,
    Failed,
    Canceled,
    /// Provider vocabulary we do not know about (kept verbatim for logging)
    Unrecognized(String),
}

impl CallOutcome {
    /// Parse a provider status string (case and surrounding whitespace ignored)
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "initiated" | "queued" => CallOutcome::Initiated,
            "ringing" => CallOutcome::Ringing,
            "answered" => CallOutcome::Answered,
            "in-progress" | "in_progress" => CallOutcome::InProgress,
            "completed" => CallOutcome::Completed,
            "no-answer" | "no_answer" => CallOutcome::NoAnswer,
            "busy" => CallOutcome::Busy,
            "failed" => CallOutcome::Failed,
            "canceled" | "cancelled" => CallOutcome::Canceled,
            _ => CallOutcome::Unrecognized(normalized),
        }
    }

    /// Canonical provider spelling
    pub fn as_str(&self) -> &str {
        match self {
            CallOutcome::Initiated => "initiated",
            CallOutcome::Ringing => "ringing",
            CallOutcome::Answered => "answered",
            CallOutcome::InProgress => "in-progress",
            CallOutcome::Completed => "completed",
            CallOutcome::NoAnswer => "no-answer",
            CallOutcome::Busy => "busy",
            CallOutcome::Failed => "failed",
            CallOutcome::Canceled => "canceled",
            CallOutcome::Unrecognized(raw) => raw,
        }
    }

    /// The call ended without reaching anyone; the attempt may be retried
    pub fn is_retryable_failure(&self) -> bool {
        matches!(
            self,
            CallOutcome::NoAnswer | CallOutcome::Busy | CallOutcome::Failed | CallOutcome::Canceled
        )
    }

    /// Statuses the dispatcher subscribes to on the status callback
    pub fn subscribed_events() -> &'static [&'static str] {
        &["completed", "no-answer", "busy", "failed", "canceled"]
    }
}

impl fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
