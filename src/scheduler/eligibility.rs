//! Eligibility predicate: may this participant be dialed right now?
//!
//! Rules are checked in order:
//! - terminal status (completed/failed) is never eligible
//! - attempt cap reached is never eligible
//! - force mode stops here: schedule and retry gap are bypassed
//! - normal mode needs a parseable, due `scheduled_time_utc`
//! - a previous call must be at least the retry gap ago

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Participant, RetryPolicy};

/// How a dispatch was requested
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Scheduler tick: schedule and retry gap apply
    #[default]
    Normal,
    /// Operator "dial now": schedule and retry gap bypassed
    Force,
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::Normal => f.write_str("normal"),
            DispatchMode::Force => f.write_str("force"),
        }
    }
}

/// Why a participant was not eligible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligible {
    Terminal,
    AttemptCap,
    NotScheduled,
    ScheduleUnparseable,
    NotDue,
    RetryGap,
}

impl fmt::Display for Ineligible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Ineligible::Terminal => "terminal status",
            Ineligible::AttemptCap => "attempt cap reached",
            Ineligible::NotScheduled => "no schedule",
            Ineligible::ScheduleUnparseable => "schedule unparseable",
            Ineligible::NotDue => "not due yet",
            Ineligible::RetryGap => "inside retry gap",
        };
        f.write_str(reason)
    }
}

/// Parse a stored timestamp.
///
/// Accepts RFC 3339 with `Z` or an explicit offset, and naive ISO-8601
/// (`T` or space separated, optional fractional seconds) read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::<FixedOffset>::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

/// Full eligibility check, reporting the first rule that failed
pub fn check(
    participant: &Participant,
    mode: DispatchMode,
    now: DateTime<Utc>,
    policy: &RetryPolicy,
) -> Result<(), Ineligible> {
    if participant.status.is_terminal() {
        return Err(Ineligible::Terminal);
    }
    if participant.is_exhausted(policy) {
        return Err(Ineligible::AttemptCap);
    }
    if mode == DispatchMode::Force {
        return Ok(());
    }

    let scheduled = participant
        .scheduled_time_utc
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or(Ineligible::NotScheduled)?;
    let scheduled = parse_timestamp(scheduled).ok_or(Ineligible::ScheduleUnparseable)?;
    if now < scheduled {
        return Err(Ineligible::NotDue);
    }

    // An unparseable last call time does not block dialing
    if let Some(last) = participant.last_call_time.as_deref().and_then(parse_timestamp)
        && now - last < policy.retry_gap
    {
        return Err(Ineligible::RetryGap);
    }

    Ok(())
}

/// Pure eligibility predicate
pub fn can_call(participant: &Participant, mode: DispatchMode, now: DateTime<Utc>, policy: &RetryPolicy) -> bool {
    check(participant, mode, now, policy).is_ok()
}
