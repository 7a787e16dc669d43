//! Webhook ingestion and the completion guard.
//!
//! Three asynchronous inputs reach a participant through its call session id:
//! status callbacks, per-question speech results (the engagement signal) and
//! recording-ready callbacks (gated by the completion guard).

pub mod engagement;
pub mod events;
pub mod guard;
pub mod ingestor;

pub use engagement::{NEGATIVE_FILLERS, looks_like_real_speech};
pub use events::{RecordingEvent, StatusEvent, TurnEvent, is_inbound};
pub use guard::GuardDecision;
pub use ingestor::{ArtifactPaths, RecordingOutcome, StatusOutcome, TurnOutcome, WebhookIngestor};
