use chrono::{DateTime, Local};

/// Countdown measured against caller-supplied timestamps.
///
/// The controller derives `now` from frame capture times, so timers never
/// read the wall clock themselves.
#[derive(Debug, Clone, Default)]
pub struct Timer {
    started_at: Option<DateTime<Local>>,
    timeout_secs: f64,
}

impl Timer {
    pub fn new(timeout_secs: f64) -> Self {
        Self { started_at: None, timeout_secs }
    }

    pub fn set(&mut self, timeout_secs: f64) {
        self.timeout_secs = timeout_secs;
    }

    pub fn timeout(&self) -> f64 {
        self.timeout_secs
    }

    pub fn start(&mut self, now: DateTime<Local>) {
        self.started_at = Some(now);
    }

    pub fn reset(&mut self) {
        self.started_at = None;
    }

    pub fn is_active(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn started_at(&self) -> Option<DateTime<Local>> {
        self.started_at
    }

    /// Seconds since start, or None when stopped
    pub fn elapsed(&self, now: DateTime<Local>) -> Option<f64> {
        self.started_at.map(|start| seconds_between(start, now))
    }

    pub fn has_timed_out(&self, now: DateTime<Local>) -> bool {
        self.elapsed(now).is_some_and(|e| e >= self.timeout_secs)
    }
}

/// Signed seconds from `earlier` to `later` with microsecond precision
pub fn seconds_between(earlier: DateTime<Local>, later: DateTime<Local>) -> f64 {
    let delta = later.signed_duration_since(earlier);
    delta.num_microseconds().map(|us| us as f64 / 1_000_000.0).unwrap_or(delta.num_seconds() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_inactive_timer_never_times_out() {
        let timer = Timer::new(0.0);
        assert!(!timer.is_active());
        assert!(!timer.has_timed_out(Local::now()));
        assert_eq!(timer.elapsed(Local::now()), None);
    }

    #[test]
    fn test_timeout_is_inclusive() {
        let t0 = Local::now();
        let mut timer = Timer::new(2.0);
        timer.start(t0);
        assert!(!timer.has_timed_out(t0 + Duration::milliseconds(1999)));
        assert!(timer.has_timed_out(t0 + Duration::seconds(2)));
        timer.reset();
        assert!(!timer.has_timed_out(t0 + Duration::seconds(10)));
    }

    #[test]
    fn test_elapsed_fractional() {
        let t0 = Local::now();
        let mut timer = Timer::new(1.0);
        timer.start(t0);
        let elapsed = timer.elapsed(t0 + Duration::milliseconds(1500)).unwrap();
        assert!((elapsed - 1.5).abs() < 1e-9);
    }
}
