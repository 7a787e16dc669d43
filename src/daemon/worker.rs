//! Dispatch worker - the single consumer of dispatch intents.
//!
//! Scheduler ticks and operator "dial now" requests are both producers on one
//! mpsc channel, so every dispatch pass runs on this task, one at a time.

use log::{debug, error, info};
use tokio::sync::{mpsc, oneshot};

use super::dispatcher::{CallDispatcher, DispatchReport};
use super::tick::{TickConfig, TickState};
use crate::error::{DialrError, Result};
use crate::id::now_utc;
use crate::scheduler::DispatchMode;
use crate::storage::PauseSwitch;

/// Channel depth; ticks beyond this are dropped
const INTENT_BUFFER: usize = 8;

/// Who asked for a dispatch pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchTrigger {
    /// Scheduler tick; honours the pause switch
    Tick,
    /// Operator request; runs even while paused
    Manual,
}

/// One request for a dispatch pass
#[derive(Debug)]
pub struct DispatchIntent {
    pub trigger: DispatchTrigger,
    pub mode: DispatchMode,
    pub reply: Option<oneshot::Sender<Result<DispatchReport>>>,
}

/// Producer side of the dispatch channel
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    tx: mpsc::Sender<DispatchIntent>,
}

impl DispatchHandle {
    /// Queue an automatic tick. Returns false if it was not queued.
    pub fn tick(&self) -> bool {
        self.tx
            .try_send(DispatchIntent {
                trigger: DispatchTrigger::Tick,
                mode: DispatchMode::Normal,
                reply: None,
            })
            .is_ok()
    }

    /// Run a manual dispatch pass and wait for its report
    pub async fn dispatch_now(&self, mode: DispatchMode) -> Result<DispatchReport> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(DispatchIntent {
                trigger: DispatchTrigger::Manual,
                mode,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| DialrError::Dispatch("dispatch worker is not running".to_string()))?;

        reply_rx
            .await
            .map_err(|_| DialrError::Dispatch("dispatch worker dropped the request".to_string()))?
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side: owns the dispatcher
pub struct DispatchWorker {
    dispatcher: CallDispatcher,
    pause: PauseSwitch,
    rx: mpsc::Receiver<DispatchIntent>,
    heartbeat_every: u64,
    state: TickState,
}

impl DispatchWorker {
    pub fn new(dispatcher: CallDispatcher, pause: PauseSwitch, tick_config: &TickConfig) -> (Self, DispatchHandle) {
        let (tx, rx) = mpsc::channel(INTENT_BUFFER);
        let worker = Self {
            dispatcher,
            pause,
            rx,
            heartbeat_every: tick_config.heartbeat_every(),
            state: TickState::new(),
        };
        (worker, DispatchHandle { tx })
    }

    /// Process intents until every handle is dropped
    pub async fn run(mut self) -> TickState {
        info!("Dispatch worker started");
        while let Some(intent) = self.rx.recv().await {
            self.handle(intent).await;
        }
        info!(
            "Dispatch worker stopped after {} ticks, {} calls placed",
            self.state.tick_count, self.state.total_placed
        );
        self.state
    }

    async fn handle(&mut self, intent: DispatchIntent) {
        match intent.trigger {
            DispatchTrigger::Tick => {
                self.state.tick();
                if self.state.heartbeat_due(self.heartbeat_every) {
                    info!(
                        "Scheduler alive: {} ticks, {} placed, {} failed, {} paused",
                        self.state.tick_count, self.state.total_placed, self.state.total_failed, self.state.paused_ticks
                    );
                }
                if self.pause.is_paused() {
                    self.state.paused();
                    debug!("Dispatch paused, tick skipped");
                    return;
                }
            }
            DispatchTrigger::Manual => {
                self.state.manual();
                info!("Manual dispatch requested ({})", intent.mode);
            }
        }

        let result = self.dispatcher.run_batch(intent.mode, now_utc()).await;
        match &result {
            Ok(report) => self.state.dispatched(report.placed, report.failed),
            Err(e) => error!("Dispatch pass failed: {}", e),
        }

        if let Some(reply) = intent.reply {
            // Requester may have given up; nothing to do then
            let _ = reply.send(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::dispatcher::CallOrigin;
    use crate::domain::RetryPolicy;
    use crate::storage::{DispatchJournal, ParticipantLedger};
    use crate::telephony::MockTelephonyProvider;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn create_worker(temp: &TempDir) -> (DispatchWorker, DispatchHandle, Arc<ParticipantLedger>, PauseSwitch) {
        let ledger = Arc::new(ParticipantLedger::open(temp.path().join("participants.json")).unwrap());
        let pause = PauseSwitch::open(temp.path().join("settings.json"));
        let dispatcher = CallDispatcher::new(
            ledger.clone(),
            DispatchJournal::open(temp.path().join("dispatch_journal.jsonl")),
            Arc::new(MockTelephonyProvider::new()),
            CallOrigin {
                from_number: "+15550000000".to_string(),
                public_base_url: "https://survey.example.org".to_string(),
            },
            RetryPolicy::default(),
        );
        let (worker, handle) = DispatchWorker::new(dispatcher, pause.clone(), &TickConfig::default());
        (worker, handle, ledger, pause)
    }

    #[tokio::test]
    async fn test_manual_dispatch_bypasses_pause() {
        let temp = TempDir::new().unwrap();
        let (worker, handle, ledger, pause) = create_worker(&temp);
        ledger.upsert("p1", "+15551234567").unwrap();
        pause.set_paused(true).unwrap();
        let task = tokio::spawn(worker.run());

        let report = handle.dispatch_now(DispatchMode::Force).await.unwrap();

        assert_eq!(report.placed, 1);
        assert_eq!(ledger.get("p1").unwrap().unwrap().attempts, 1);
        drop(handle);
        let state = task.await.unwrap();
        assert_eq!(state.manual_count, 1);
    }

    #[tokio::test]
    async fn test_tick_skipped_while_paused() {
        let temp = TempDir::new().unwrap();
        let (worker, handle, ledger, pause) = create_worker(&temp);
        ledger.upsert("p1", "+15551234567").unwrap();
        ledger
            .update_participant("p1", |p| {
                p.scheduled_time_utc = Some("2020-01-01T00:00:00Z".to_string());
                Ok(())
            })
            .unwrap();
        pause.set_paused(true).unwrap();

        assert!(handle.tick());
        drop(handle);
        let state = worker.run().await;

        assert_eq!(state.tick_count, 1);
        assert_eq!(state.paused_ticks, 1);
        assert_eq!(ledger.get("p1").unwrap().unwrap().attempts, 0);
    }

    #[tokio::test]
    async fn test_tick_dispatches_when_not_paused() {
        let temp = TempDir::new().unwrap();
        let (worker, handle, ledger, _pause) = create_worker(&temp);
        ledger.upsert("p1", "+15551234567").unwrap();
        ledger
            .update_participant("p1", |p| {
                p.scheduled_time_utc = Some("2020-01-01T00:00:00Z".to_string());
                Ok(())
            })
            .unwrap();

        assert!(handle.tick());
        drop(handle);
        let state = worker.run().await;

        assert_eq!(state.total_placed, 1);
        assert_eq!(ledger.get("p1").unwrap().unwrap().attempts, 1);
    }

    #[tokio::test]
    async fn test_dispatch_now_without_worker() {
        let temp = TempDir::new().unwrap();
        let (worker, handle, _ledger, _pause) = create_worker(&temp);
        drop(worker);
        let err = handle.dispatch_now(DispatchMode::Force).await.unwrap_err();
        assert!(matches!(err, DialrError::Dispatch(_)));
    }
}
