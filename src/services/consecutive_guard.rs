//! Consecutive lockout fail-safe
//!
//! A jammed sensor or broken camera produces lockout after lockout. When
//! lockouts keep landing inside the configured window of each other the
//! guard trips and the controller halts automatic operation.

use chrono::{DateTime, Local};
use tracing::{debug, warn};

use crate::domain::timer::seconds_between;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardVerdict {
    /// Lockout counted, current consecutive count attached
    Counted(u32),
    /// Threshold reached; automatic operation must stop
    Halt(u32),
}

#[derive(Debug, Clone)]
pub struct ConsecutiveLockoutGuard {
    /// 0 disables the halt
    max_count: u32,
    /// Seconds between lockout starts that still count as consecutive
    window_secs: f64,
    count: u32,
    last_lockout_at: Option<DateTime<Local>>,
}

impl ConsecutiveLockoutGuard {
    pub fn new(max_count: u32, window_secs: f64) -> Self {
        Self { max_count, window_secs, count: 0, last_lockout_at: None }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn max_count(&self) -> u32 {
        self.max_count
    }

    pub fn window_secs(&self) -> f64 {
        self.window_secs
    }

    pub fn last_lockout_at(&self) -> Option<DateTime<Local>> {
        self.last_lockout_at
    }

    /// Register a transition into lockout at `now`
    pub fn on_lockout(&mut self, now: DateTime<Local>) -> GuardVerdict {
        let within_window = self
            .last_lockout_at
            .is_some_and(|last| seconds_between(last, now) <= self.window_secs);

        if within_window {
            self.count += 1;
            debug!(count = self.count, max = self.max_count, "consecutive_lockout");
        } else {
            if self.count > 1 {
                debug!(previous = self.count, "consecutive_lockout_reset");
            }
            self.count = 1;
        }
        self.last_lockout_at = Some(now);

        if self.max_count > 0 && self.count >= self.max_count {
            warn!(count = self.count, window_secs = self.window_secs, "consecutive_lockout_limit");
            GuardVerdict::Halt(self.count)
        } else {
            GuardVerdict::Counted(self.count)
        }
    }

    /// Clear the counter after a successful session or a forced unlock
    pub fn reset(&mut self) {
        self.count = 0;
    }
}
