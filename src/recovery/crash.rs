//! Crash recovery for interrupted dispatch passes and lost call outcomes.
//!
//! Two situations leave the ledger behind reality:
//! 1. The process died after the provider accepted calls but before the batch
//!    was written. The dispatch journal still holds those calls; replaying it
//!    records the attempts so the cap keeps counting them.
//! 2. A call is `in_progress` but no terminal status ever arrived. After
//!    `stale_after` the participant is released back to `pending` (or
//!    `failed` when out of attempts).

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};

use crate::domain::{ParticipantStatus, RetryPolicy};
use crate::error::Result;
use crate::scheduler::parse_timestamp;
use crate::storage::{DispatchJournal, ParticipantLedger};

/// Result of replaying a single journal entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayResult {
    /// The attempt was written to the ledger.
    Recorded { participant_id: String, session_id: String },

    /// The ledger already knew about this session.
    AlreadyRecorded { participant_id: String },

    /// The participant no longer exists.
    Missing { participant_id: String },

    /// The participant refused the attempt (terminal or capped).
    Rejected { participant_id: String, reason: String },
}

impl ReplayResult {
    pub fn participant_id(&self) -> &str {
        match self {
            ReplayResult::Recorded { participant_id, .. }
            | ReplayResult::AlreadyRecorded { participant_id }
            | ReplayResult::Missing { participant_id }
            | ReplayResult::Rejected { participant_id, .. } => participant_id,
        }
    }
}

/// Statistics about one recovery run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Journal entries written to the ledger.
    pub replayed: usize,

    /// Journal entries the ledger already had.
    pub already_recorded: usize,

    /// Journal entries for unknown or refusing participants.
    pub dropped: usize,

    /// Stale participants moved back to pending.
    pub released: usize,

    /// Stale participants that ran out of attempts.
    pub failed: usize,
}

impl RecoveryStats {
    pub fn total(&self) -> usize {
        self.replayed + self.already_recorded + self.dropped + self.released + self.failed
    }

    pub fn is_clean(&self) -> bool {
        self.total() == 0
    }
}

/// Replays the dispatch journal and sweeps stale calls.
pub struct Reconciler {
    ledger: Arc<ParticipantLedger>,
    journal: DispatchJournal,
    policy: RetryPolicy,
}

impl Reconciler {
    pub fn new(ledger: Arc<ParticipantLedger>, journal: DispatchJournal, policy: RetryPolicy) -> Self {
        Self {
            ledger,
            journal,
            policy,
        }
    }

    /// Write any journalled calls the ledger is missing, then clear the journal.
    pub fn reconcile_journal(&self) -> Result<Vec<ReplayResult>> {
        let entries = self.journal.entries()?;
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        info!("Replaying {} dispatch journal entries", entries.len());

        let policy = self.policy;
        let results = self.ledger.update(|ledger| {
            let mut results = Vec::with_capacity(entries.len());
            for entry in &entries {
                let participant_id = entry.participant_id.clone();
                let Some(participant) = ledger.get_mut(&entry.participant_id) else {
                    warn!("Journalled call {} for unknown participant {}", entry.session_id, participant_id);
                    results.push(ReplayResult::Missing { participant_id });
                    continue;
                };

                if participant.last_call_session_id.as_deref() == Some(entry.session_id.as_str()) {
                    results.push(ReplayResult::AlreadyRecorded { participant_id });
                    continue;
                }

                let placed_at = parse_timestamp(&entry.placed_at).unwrap_or_else(Utc::now);
                match participant.mark_call_started(&entry.session_id, placed_at, &policy) {
                    Ok(()) => {
                        info!("Recovered call {} for {}", entry.session_id, participant_id);
                        results.push(ReplayResult::Recorded {
                            participant_id,
                            session_id: entry.session_id.clone(),
                        });
                    }
                    Err(e) => {
                        warn!("Journalled call {} for {} dropped: {}", entry.session_id, participant_id, e);
                        results.push(ReplayResult::Rejected {
                            participant_id,
                            reason: e.to_string(),
                        });
                    }
                }
            }
            Ok(results)
        })?;

        self.journal.clear()?;
        Ok(results)
    }

    /// Release `in_progress` participants whose last call is older than `stale_after`.
    ///
    /// Returns the ids released, with their new status.
    pub fn sweep_stale(&self, now: DateTime<Utc>, stale_after: Duration) -> Result<Vec<(String, ParticipantStatus)>> {
        let snapshot = self.ledger.load()?;
        let any_stale = snapshot
            .values()
            .any(|p| p.status == ParticipantStatus::InProgress && is_stale(p.last_call_time.as_deref(), now, stale_after));
        if !any_stale {
            return Ok(Vec::new());
        }

        let policy = self.policy;
        self.ledger.update(|ledger| {
            let mut released = Vec::new();
            for (participant_id, participant) in ledger.iter_mut() {
                if participant.status != ParticipantStatus::InProgress
                    || !is_stale(participant.last_call_time.as_deref(), now, stale_after)
                {
                    continue;
                }
                let status = participant.release_stale(&policy);
                warn!(
                    "Call {} for {} never reported an outcome, now {}",
                    participant.last_call_session_id.as_deref().unwrap_or("-"),
                    participant_id,
                    status
                );
                released.push((participant_id.clone(), status));
            }
            Ok(released)
        })
    }

    /// Journal replay followed by the stale sweep.
    pub fn recover(&self, now: DateTime<Utc>, stale_after: Duration) -> Result<RecoveryStats> {
        let mut stats = RecoveryStats::default();

        for result in self.reconcile_journal()? {
            match result {
                ReplayResult::Recorded { .. } => stats.replayed += 1,
                ReplayResult::AlreadyRecorded { .. } => stats.already_recorded += 1,
                ReplayResult::Missing { .. } | ReplayResult::Rejected { .. } => stats.dropped += 1,
            }
        }

        for (_, status) in self.sweep_stale(now, stale_after)? {
            match status {
                ParticipantStatus::Failed => stats.failed += 1,
                _ => stats.released += 1,
            }
        }

        if !stats.is_clean() {
            info!(
                "Recovery: {} replayed, {} already recorded, {} dropped, {} released, {} failed",
                stats.replayed, stats.already_recorded, stats.dropped, stats.released, stats.failed
            );
        }
        Ok(stats)
    }
}

/// A call started at `last_call_time` is stale once `stale_after` has passed.
///
/// A missing or unreadable timestamp counts as stale.
pub fn is_stale(last_call_time: Option<&str>, now: DateTime<Utc>, stale_after: Duration) -> bool {
    match last_call_time.and_then(parse_timestamp) {
        Some(started) => now - started >= stale_after,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::format_utc;
    use crate::storage::JournalEntry;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn create_reconciler(temp: &TempDir) -> (Reconciler, Arc<ParticipantLedger>, DispatchJournal) {
        let ledger = Arc::new(ParticipantLedger::open(temp.path().join("participants.json")).unwrap());
        let journal = DispatchJournal::open(temp.path().join("dispatch_journal.jsonl"));
        let reconciler = Reconciler::new(ledger.clone(), journal.clone(), RetryPolicy::default());
        (reconciler, ledger, journal)
    }

    fn entry(participant_id: &str, session_id: &str) -> JournalEntry {
        JournalEntry {
            participant_id: participant_id.to_string(),
            session_id: session_id.to_string(),
            placed_at: format_utc(now()),
        }
    }

    #[test]
    fn test_is_stale() {
        let stale_after = Duration::hours(2);
        assert!(is_stale(None, now(), stale_after));
        assert!(is_stale(Some("garbage"), now(), stale_after));
        assert!(is_stale(Some("2026-03-01T09:00:00Z"), now(), stale_after));
        assert!(!is_stale(Some("2026-03-01T11:00:00Z"), now(), stale_after));
    }

    #[test]
    fn test_replay_records_missing_attempt() {
        let temp = TempDir::new().unwrap();
        let (reconciler, ledger, journal) = create_reconciler(&temp);
        ledger.upsert("p1", "+15551234567").unwrap();
        journal.record(&entry("p1", "CA1")).unwrap();

        let results = reconciler.reconcile_journal().unwrap();

        assert_eq!(
            results,
            vec![ReplayResult::Recorded {
                participant_id: "p1".to_string(),
                session_id: "CA1".to_string()
            }]
        );
        let p1 = ledger.get("p1").unwrap().unwrap();
        assert_eq!(p1.attempts, 1);
        assert_eq!(p1.status, ParticipantStatus::InProgress);
        assert_eq!(p1.last_call_session_id.as_deref(), Some("CA1"));
        assert!(journal.entries().unwrap().is_empty());
    }

    #[test]
    fn test_replay_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let (reconciler, ledger, journal) = create_reconciler(&temp);
        ledger.upsert("p1", "+15551234567").unwrap();
        journal.record(&entry("p1", "CA1")).unwrap();
        reconciler.reconcile_journal().unwrap();

        journal.record(&entry("p1", "CA1")).unwrap();
        let results = reconciler.reconcile_journal().unwrap();

        assert_eq!(results[0], ReplayResult::AlreadyRecorded {
            participant_id: "p1".to_string()
        });
        assert_eq!(ledger.get("p1").unwrap().unwrap().attempts, 1);
    }

    #[test]
    fn test_replay_unknown_participant() {
        let temp = TempDir::new().unwrap();
        let (reconciler, _ledger, journal) = create_reconciler(&temp);
        journal.record(&entry("ghost", "CA1")).unwrap();

        let results = reconciler.reconcile_journal().unwrap();
        assert_eq!(results[0].participant_id(), "ghost");
        assert!(matches!(results[0], ReplayResult::Missing { .. }));
    }

    #[test]
    fn test_sweep_releases_stale_calls() {
        let temp = TempDir::new().unwrap();
        let (reconciler, ledger, _journal) = create_reconciler(&temp);
        ledger.upsert("stale", "+15551111111").unwrap();
        ledger.upsert("fresh", "+15552222222").unwrap();
        ledger.upsert("capped", "+15553333333").unwrap();
        ledger
            .update(|l| {
                let old = now() - Duration::hours(3);
                l.get_mut("stale").unwrap().mark_call_started("CA1", old, &RetryPolicy::default())?;
                l.get_mut("fresh").unwrap().mark_call_started("CA2", now(), &RetryPolicy::default())?;
                let capped = l.get_mut("capped").unwrap();
                capped.attempts = 2;
                capped.mark_call_started("CA3", old, &RetryPolicy::default())?;
                Ok(())
            })
            .unwrap();

        let stats = reconciler.recover(now(), Duration::hours(2)).unwrap();

        assert_eq!(stats.released, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(ledger.get("stale").unwrap().unwrap().status, ParticipantStatus::Pending);
        assert_eq!(ledger.get("fresh").unwrap().unwrap().status, ParticipantStatus::InProgress);
        assert_eq!(ledger.get("capped").unwrap().unwrap().status, ParticipantStatus::Failed);
    }

    #[test]
    fn test_clean_run() {
        let temp = TempDir::new().unwrap();
        let (reconciler, ledger, _journal) = create_reconciler(&temp);
        ledger.upsert("p1", "+15551234567").unwrap();

        let stats = reconciler.recover(now(), Duration::hours(2)).unwrap();
        assert!(stats.is_clean());
    }
}
