//! Completion guard: the multi-signal gate in front of the audio pipeline.
//!
//! Before the recording is fetched:
//! - a participant already in a sink state is left alone
//! - a call whose last known outcome was a retryable failure is skipped
//! - a call without observed engagement is skipped
//!
//! After transcription, a transcript under the word threshold is noise.

use std::fmt;

use crate::domain::{CallOutcome, Participant, ParticipantStatus};
use crate::pipeline::Transcript;

/// Outcome of the pre-pipeline stages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// All pre-pipeline stages passed
    Proceed,
    /// Already completed or failed; a redelivered webhook must not re-run
    AlreadyTerminal(ParticipantStatus),
    /// Last status callback reported no-answer/busy/failed/canceled
    RetryableFailure(CallOutcome),
    /// Nobody spoke during this attempt
    NotEngaged,
}

impl GuardDecision {
    pub fn is_proceed(&self) -> bool {
        matches!(self, GuardDecision::Proceed)
    }
}

impl fmt::Display for GuardDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardDecision::Proceed => f.write_str("proceed"),
            GuardDecision::AlreadyTerminal(status) => write!(f, "participant already {}", status),
            GuardDecision::RetryableFailure(outcome) => write!(f, "last call status {}", outcome),
            GuardDecision::NotEngaged => f.write_str("not engaged"),
        }
    }
}

/// Stages 1 and 2 (plus the sink check)
pub fn evaluate(participant: &Participant) -> GuardDecision {
    if participant.status.is_terminal() {
        return GuardDecision::AlreadyTerminal(participant.status);
    }
    if let Some(raw) = participant.last_call_status.as_deref() {
        let outcome = CallOutcome::parse(raw);
        if outcome.is_retryable_failure() {
            return GuardDecision::RetryableFailure(outcome);
        }
    }
    if !participant.engaged {
        return GuardDecision::NotEngaged;
    }
    GuardDecision::Proceed
}

/// Stage 3: is the transcript long enough to be a response?
pub fn transcript_accepted(transcript: &Transcript, min_words: usize) -> bool {
    transcript.word_count() >= min_words
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engaged() -> Participant {
        let mut p = Participant::new("+15551234567");
        p.status = ParticipantStatus::InProgress;
        p.attempts = 1;
        p.engaged = true;
        p
    }

    #[test]
    fn test_engaged_proceeds() {
        assert_eq!(evaluate(&engaged()), GuardDecision::Proceed);
    }

    #[test]
    fn test_completed_call_status_still_proceeds() {
        let mut p = engaged();
        p.last_call_status = Some("completed".to_string());
        assert!(evaluate(&p).is_proceed());
    }

    #[test]
    fn test_retryable_failure_wins_over_engagement() {
        for raw in ["no-answer", "busy", "failed", "canceled"] {
            let mut p = engaged();
            p.last_call_status = Some(raw.to_string());
            assert!(matches!(evaluate(&p), GuardDecision::RetryableFailure(_)), "{raw}");
        }
    }

    #[test]
    fn test_not_engaged() {
        let mut p = engaged();
        p.engaged = false;
        assert_eq!(evaluate(&p), GuardDecision::NotEngaged);
    }

    #[test]
    fn test_terminal_first() {
        let mut p = engaged();
        p.status = ParticipantStatus::Completed;
        assert_eq!(evaluate(&p), GuardDecision::AlreadyTerminal(ParticipantStatus::Completed));
    }

    #[test]
    fn test_transcript_threshold() {
        assert!(!transcript_accepted(&Transcript::new("one two three four", None), 5));
        assert!(transcript_accepted(&Transcript::new("one two three four five", None), 5));
    }
}
