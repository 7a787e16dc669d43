//! Operator scheduling: turn a human-entered local time into the stored
//! UTC comparison field.

use chrono::{DateTime, LocalResult, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use log::info;
use serde::{Deserialize, Serialize};

use crate::domain::participant::mask_phone;
use crate::error::{DialrError, Result};
use crate::id::format_utc;
use crate::storage::ParticipantLedger;

/// Accepted operator input formats
const LOCAL_FORMATS: &[&str] = &["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// The two stored representations of a schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTime {
    /// RFC 3339 with the local offset
    pub local: String,
    /// RFC 3339 with a trailing `Z`
    pub utc: String,
}

/// Parse an IANA zone name
pub fn resolve_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| DialrError::Config(format!("unknown timezone: {}", name)))
}

/// Interpret `input` as wall-clock time in `tz`.
///
/// A time that occurs twice (DST fall-back) resolves to the earlier instant.
/// A time that does not exist (DST spring-forward) is rejected.
pub fn parse_local_time(input: &str, tz: Tz) -> Result<DateTime<Tz>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DialrError::Validation("local time is empty".to_string()));
    }

    let naive = LOCAL_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(input, format).ok())
        .ok_or_else(|| {
            DialrError::Validation(format!("cannot parse '{}', expected YYYY-MM-DD HH:MM", input))
        })?;

    match tz.from_local_datetime(&naive) {
        LocalResult::Single(local) => Ok(local),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest),
        LocalResult::None => Err(DialrError::Validation(format!(
            "{} does not exist in {} (clock change)",
            input, tz
        ))),
    }
}

/// Convert operator input to the stored representations
pub fn to_scheduled_time(input: &str, tz: Tz) -> Result<ScheduledTime> {
    let local = parse_local_time(input, tz)?;
    Ok(ScheduledTime {
        local: local.to_rfc3339_opts(SecondsFormat::Secs, false),
        utc: format_utc(local.with_timezone(&Utc)),
    })
}

/// Set a participant's dispatch target.
///
/// Input is validated before the ledger is touched; a rejected input leaves
/// the participant unchanged. Terminal participants cannot be scheduled.
pub fn schedule(ledger: &ParticipantLedger, participant_id: &str, input: &str, tz: Tz) -> Result<ScheduledTime> {
    let scheduled = to_scheduled_time(input, tz)?;

    ledger.update_participant(participant_id, |p| {
        p.set_schedule(scheduled.local.clone(), scheduled.utc.clone())?;
        info!(
            "Scheduled participant {} ({}) for {} ({})",
            participant_id,
            mask_phone(&p.phone),
            scheduled.local,
            scheduled.utc
        );
        Ok(())
    })?;

    Ok(scheduled)
}
