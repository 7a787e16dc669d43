//! Domain types for Dialr
//!
//! - Participant: one survey subject and its call-lifecycle transitions
//! - CallOutcome: provider call status, parsed into a closed set of variants

pub mod outcome;
pub mod participant;

pub use outcome::CallOutcome;
pub use participant::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_GAP_SECS, Participant, ParticipantStatus, ParticipantSummary,
    ResponseArtifacts, RetryPolicy, StatusChange, mask_phone,
};
