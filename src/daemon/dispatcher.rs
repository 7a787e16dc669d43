//! Call dispatcher - places calls for every eligible participant in a snapshot.
//!
//! Per-participant provider failures are isolated. Each accepted call is
//! journalled as soon as the provider returns its session id; the ledger is
//! written once, after the batch, and only if something was placed. The
//! journal is cleared after that write succeeds.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::domain::{RetryPolicy, mask_phone};
use crate::error::Result;
use crate::id::format_utc;
use crate::scheduler::{DispatchMode, check};
use crate::storage::{DispatchJournal, JournalEntry, ParticipantLedger};
use crate::telephony::{CallRequest, TelephonyProvider};

/// What one dispatch pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub mode: DispatchMode,
    /// Participants that passed eligibility
    pub eligible: usize,
    /// Calls the provider accepted
    pub placed: usize,
    /// Calls the provider rejected
    pub failed: usize,
    /// Eligible participants with no phone number
    pub skipped_no_phone: usize,
    /// Participant ids with a placed call, in dispatch order
    pub placed_ids: Vec<String>,
}

/// Where outbound calls come from and call back to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOrigin {
    pub from_number: String,
    pub public_base_url: String,
}

pub struct CallDispatcher {
    ledger: Arc<ParticipantLedger>,
    journal: DispatchJournal,
    telephony: Arc<dyn TelephonyProvider>,
    origin: CallOrigin,
    policy: RetryPolicy,
}

impl CallDispatcher {
    pub fn new(
        ledger: Arc<ParticipantLedger>,
        journal: DispatchJournal,
        telephony: Arc<dyn TelephonyProvider>,
        origin: CallOrigin,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            ledger,
            journal,
            telephony,
            origin,
            policy,
        }
    }

    /// One dispatch pass over the current ledger
    pub async fn run_batch(&self, mode: DispatchMode, now: DateTime<Utc>) -> Result<DispatchReport> {
        let snapshot = self.ledger.load()?;
        let mut report = DispatchReport {
            mode,
            ..Default::default()
        };

        let mut placed: Vec<(String, String)> = Vec::new();
        for (participant_id, participant) in &snapshot {
            if let Err(reason) = check(participant, mode, now, &self.policy) {
                debug!("Participant {} not eligible: {}", participant_id, reason);
                continue;
            }
            report.eligible += 1;

            let phone = participant.phone.trim();
            if phone.is_empty() {
                warn!("Participant {} has no phone number, skipping", participant_id);
                report.skipped_no_phone += 1;
                continue;
            }

            let request = CallRequest::new(phone, &self.origin.from_number, &self.origin.public_base_url);
            match self.telephony.place_call(&request).await {
                Ok(session_id) => {
                    info!(
                        "Calling {} -> {} | CallSid={}",
                        participant_id,
                        mask_phone(phone),
                        session_id
                    );
                    let entry = JournalEntry {
                        participant_id: participant_id.clone(),
                        session_id: session_id.clone(),
                        placed_at: format_utc(now),
                    };
                    if let Err(e) = self.journal.record(&entry) {
                        error!("Failed to journal call {} for {}: {}", session_id, participant_id, e);
                    }
                    placed.push((participant_id.clone(), session_id));
                }
                Err(e) => {
                    warn!("Dispatch failed for {} ({}): {}", participant_id, mask_phone(phone), e);
                    report.failed += 1;
                }
            }
        }

        if placed.is_empty() {
            return Ok(report);
        }

        let policy = self.policy;
        let recorded = self.ledger.update(|ledger| {
            let mut recorded = Vec::new();
            for (participant_id, session_id) in &placed {
                let Some(participant) = ledger.get_mut(participant_id) else {
                    warn!("Participant {} vanished before call {} was recorded", participant_id, session_id);
                    continue;
                };
                match participant.mark_call_started(session_id, now, &policy) {
                    Ok(()) => recorded.push(participant_id.clone()),
                    Err(e) => warn!("Call {} for {} not recorded: {}", session_id, participant_id, e),
                }
            }
            Ok(recorded)
        })?;

        if let Err(e) = self.journal.clear() {
            warn!("Failed to clear dispatch journal: {}", e);
        }

        report.placed = recorded.len();
        report.placed_ids = recorded;
        info!(
            "Dispatch ({}) placed {} of {} eligible, {} failed",
            mode, report.placed, report.eligible, report.failed
        );
        Ok(report)
    }
}
