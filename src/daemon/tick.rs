//! Tick loop - fixed-interval driver for automatic dispatch
//!
//! The ticker only produces intents; the dispatch worker decides whether a tick
//! runs (pause switch) and does the work. Ticks never overlap: a tick that
//! finds the worker still busy is dropped.

use std::time::Duration;

use log::{debug, info};
use tokio::time::MissedTickBehavior;

use super::worker::DispatchHandle;
use crate::config::SchedulerConfig;

/// Configuration for the tick loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickConfig {
    /// Interval between ticks
    pub tick_interval: Duration,
    /// Delay before the first tick
    pub startup_delay: Duration,
    /// Roughly how often the worker logs that it is alive
    pub heartbeat: Duration,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(15),
            startup_delay: Duration::from_secs(2),
            heartbeat: Duration::from_secs(120),
        }
    }
}

impl TickConfig {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            tick_interval: Duration::from_secs(config.interval_secs.max(1)),
            startup_delay: Duration::from_secs(config.startup_delay_secs),
            heartbeat: Duration::from_secs(config.heartbeat_secs),
        }
    }

    /// Ticks between heartbeat log lines (at least 1)
    pub fn heartbeat_every(&self) -> u64 {
        let interval = self.tick_interval.as_secs().max(1);
        (self.heartbeat.as_secs() / interval).max(1)
    }
}

/// Counters kept by the dispatch worker across ticks
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickState {
    /// Automatic ticks received
    pub tick_count: u64,
    /// Ticks skipped because dispatch was paused
    pub paused_ticks: u64,
    /// Manual dispatches handled
    pub manual_count: u64,
    /// Calls placed this session
    pub total_placed: u64,
    /// Provider rejections this session
    pub total_failed: u64,
}

impl TickState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an automatic tick
    pub fn tick(&mut self) {
        self.tick_count += 1;
    }

    pub fn paused(&mut self) {
        self.paused_ticks += 1;
    }

    pub fn manual(&mut self) {
        self.manual_count += 1;
    }

    /// Record the result of a dispatch pass
    pub fn dispatched(&mut self, placed: usize, failed: usize) {
        self.total_placed += placed as u64;
        self.total_failed += failed as u64;
    }

    /// True on every `every`-th tick
    pub fn heartbeat_due(&self, every: u64) -> bool {
        self.tick_count > 0 && self.tick_count % every.max(1) == 0
    }
}

/// Drive automatic dispatch until the worker goes away
pub async fn run_ticker(handle: DispatchHandle, config: TickConfig) {
    info!(
        "Scheduler started: interval {}s, first tick in {}s",
        config.tick_interval.as_secs(),
        config.startup_delay.as_secs()
    );
    tokio::time::sleep(config.startup_delay).await;

    let mut interval = tokio::time::interval(config.tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        if !handle.tick() {
            if handle.is_closed() {
                info!("Dispatch worker stopped, scheduler exiting");
                return;
            }
            debug!("Dispatch worker busy, tick dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_config_default() {
        let config = TickConfig::default();
        assert_eq!(config.tick_interval, Duration::from_secs(15));
        assert_eq!(config.startup_delay, Duration::from_secs(2));
        assert_eq!(config.heartbeat_every(), 8);
    }

    #[test]
    fn test_tick_config_from_config() {
        let config = TickConfig::from_config(&SchedulerConfig {
            interval_secs: 0,
            startup_delay_secs: 0,
            heartbeat_secs: 0,
        });
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert_eq!(config.heartbeat_every(), 1);
    }

    #[test]
    fn test_tick_state_counts() {
        let mut state = TickState::new();
        state.tick();
        state.paused();
        state.manual();
        state.dispatched(3, 1);
        state.dispatched(1, 0);

        assert_eq!(state.tick_count, 1);
        assert_eq!(state.paused_ticks, 1);
        assert_eq!(state.manual_count, 1);
        assert_eq!(state.total_placed, 4);
        assert_eq!(state.total_failed, 1);
    }

    #[test]
    fn test_heartbeat_due() {
        let mut state = TickState::new();
        assert!(!state.heartbeat_due(8));
        for _ in 0..7 {
            state.tick();
        }
        assert!(!state.heartbeat_due(8));
        state.tick();
        assert!(state.heartbeat_due(8));
    }
}
