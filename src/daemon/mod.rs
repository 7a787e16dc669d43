//! Daemon Core - dispatcher, dispatch worker, and tick loop
//!
//! The daemon is the long-running side of the system:
//! - The dispatcher places calls for every eligible participant in one pass
//! - A single worker owns the dispatcher, so passes never overlap
//! - The tick loop asks the worker for a pass on a fixed interval

pub mod dispatcher;
pub mod tick;
pub mod worker;

pub use dispatcher::{CallDispatcher, CallOrigin, DispatchReport};
pub use tick::{TickConfig, TickState, run_ticker};
pub use worker::{DispatchHandle, DispatchIntent, DispatchTrigger, DispatchWorker};
