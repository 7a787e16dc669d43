//! Recovery after restarts and lost callbacks.
//!
//! - **Journal replay**: record calls placed by a batch that never reached the ledger
//! - **Stale sweep**: release participants whose call outcome never arrived

mod crash;

pub use crash::{Reconciler, RecoveryStats, ReplayResult, is_stale};
