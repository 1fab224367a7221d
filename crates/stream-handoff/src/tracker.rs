//! Periodic position sampling.
//!
//! While playing, a crossbeam `tick` channel fires at the poll interval and the
//! player re-reads the authoritative clock on every tick. Positions are never
//! integrated from deltas, so there is nothing to drift.

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, never, tick};

#[derive(Debug)]
pub struct TimeTracker {
    interval: Duration,
    ticker: Option<Receiver<Instant>>,
    current_time: f64,
}

impl TimeTracker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ticker: None,
            current_time: 0.0,
        }
    }

    /// Start ticking; no-op when already running.
    pub fn start(&mut self) {
        if self.ticker.is_none() {
            self.ticker = Some(tick(self.interval));
        }
    }

    /// Stop ticking immediately. Dropping the receiver cancels the timer.
    pub fn stop(&mut self) {
        self.ticker = None;
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Receiver to select on: the ticker, or one that never fires when stopped.
    pub fn ticks(&self) -> Receiver<Instant> {
        self.ticker.clone().unwrap_or_else(never)
    }

    /// Non-blocking check for a pending tick; drains any backlog.
    pub fn tick_due(&self) -> bool {
        match &self.ticker {
            Some(rx) => rx.try_iter().count() > 0,
            None => false,
        }
    }

    /// Record a freshly read position.
    pub fn publish(&mut self, time: f64) {
        self.current_time = time;
    }

    /// Last published position in seconds.
    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn reset(&mut self) {
        self.stop();
        self.current_time = 0.0;
    }
}
