//! Deciding who may be called and when.
//!
//! - **Eligibility**: pure predicate over one participant, a dispatch mode and
//!   the current time.
//! - **Schedule**: operator-entered local times converted to the stored UTC
//!   comparison field.

mod eligibility;
mod schedule;

pub use eligibility::{DispatchMode, Ineligible, can_call, check, parse_timestamp};
pub use schedule::{ScheduledTime, parse_local_time, resolve_timezone, schedule, to_scheduled_time};
