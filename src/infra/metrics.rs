//! Controller metrics
//!
//! Counters and histograms are plain relaxed atomics; they are statistics
//! only and never drive controller decisions. Two views exist:
//! - [`Metrics::snapshot`] is cumulative and side-effect free (Prometheus)
//! - [`Metrics::report`] is the delta since the previous report (log line)

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

use crate::domain::types::StateName;

/// Upper bounds of the finite histogram buckets, in microseconds. Each bound
/// doubles the previous one; one extra overflow bucket follows.
pub const LATENCY_BOUNDS_US: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];

/// Finite buckets plus the overflow bucket
pub const LATENCY_BUCKETS: usize = LATENCY_BOUNDS_US.len() + 1;

/// Numeric controller state for the Prometheus gauge
pub fn state_code(state: StateName) -> u64 {
    match state {
        StateName::Initial => 0,
        StateName::Waiting => 1,
        StateName::Matching => 2,
        StateName::KeepOpen => 3,
        StateName::LockedOut => 4,
        StateName::Ignoring => 5,
    }
}

/// Inverse of `state_code`
pub fn state_from_code(code: u64) -> Option<StateName> {
    Some(match code {
        0 => StateName::Initial,
        1 => StateName::Waiting,
        2 => StateName::Matching,
        3 => StateName::KeepOpen,
        4 => StateName::LockedOut,
        5 => StateName::Ignoring,
        _ => return None,
    })
}

/// Exponential latency histogram
pub struct LatencyHistogram {
    counts: [AtomicU64; LATENCY_BUCKETS],
    sum_us: AtomicU64,
    /// Largest sample since the last `take_max`
    max_us: AtomicU64,
}

impl LatencyHistogram {
    fn new() -> Self {
        Self {
            counts: std::array::from_fn(|_| AtomicU64::new(0)),
            sum_us: AtomicU64::new(0),
            max_us: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, us: u64) {
        let idx = LATENCY_BOUNDS_US.partition_point(|&bound| bound < us);
        self.counts[idx].fetch_add(1, Ordering::Relaxed);
        self.sum_us.fetch_add(us, Ordering::Relaxed);
        self.max_us.fetch_max(us, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            counts: std::array::from_fn(|i| self.counts[i].load(Ordering::Relaxed)),
            sum_us: self.sum_us.load(Ordering::Relaxed),
        }
    }

    fn take_max(&self) -> u64 {
        self.max_us.swap(0, Ordering::Relaxed)
    }
}

/// Point-in-time copy of a histogram
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistogramSnapshot {
    pub counts: [u64; LATENCY_BUCKETS],
    pub sum_us: u64,
}

impl HistogramSnapshot {
    pub fn count(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn mean_us(&self) -> u64 {
        match self.count() {
            0 => 0,
            n => self.sum_us / n,
        }
    }

    /// Upper bound of the bucket holding quantile `q`. The overflow bucket
    /// reports twice the last finite bound.
    pub fn quantile_us(&self, q: f64) -> u64 {
        let total = self.count();
        if total == 0 {
            return 0;
        }
        let target = ((total as f64) * q).ceil().max(1.0) as u64;
        let mut seen = 0;
        for (i, &n) in self.counts.iter().enumerate() {
            seen += n;
            if seen >= target {
                return LATENCY_BOUNDS_US.get(i).copied().unwrap_or(LATENCY_BOUNDS_US[9] * 2);
            }
        }
        LATENCY_BOUNDS_US[9] * 2
    }

    /// Samples recorded after `earlier` was taken
    pub fn since(&self, earlier: &HistogramSnapshot) -> HistogramSnapshot {
        HistogramSnapshot {
            counts: std::array::from_fn(|i| self.counts[i].saturating_sub(earlier.counts[i])),
            sum_us: self.sum_us.saturating_sub(earlier.sum_us),
        }
    }
}

/// State kept between two periodic reports
struct ReportMark {
    at: Instant,
    frames_total: u64,
    frame_latency: HistogramSnapshot,
}

pub struct Metrics {
    frames_total: AtomicU64,
    /// Frames dropped because the control loop queue was full
    frames_dropped: AtomicU64,
    frame_latency: LatencyHistogram,
    matches_total: AtomicU64,
    /// Match attempts that failed or errored
    matches_failed: AtomicU64,
    sessions_total: AtomicU64,
    /// Sessions that let the animal through
    sessions_admitted: AtomicU64,
    lockouts_total: AtomicU64,
    unlocks_total: AtomicU64,
    consecutive_lockouts: AtomicU64,
    /// See `state_code`
    state: AtomicU64,
    templates_rendered: AtomicU64,
    template_failures: AtomicU64,
    publishes_dropped: AtomicU64,
    commands_spawned: AtomicU64,
    rfid_reads: AtomicU64,
    actuator_commands: AtomicU64,
    actuator_failures: AtomicU64,
    /// Time from enqueue to worker pickup
    actuator_queue_delay: LatencyHistogram,
    last_report: Mutex<ReportMark>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            frames_total: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            frame_latency: LatencyHistogram::new(),
            matches_total: AtomicU64::new(0),
            matches_failed: AtomicU64::new(0),
            sessions_total: AtomicU64::new(0),
            sessions_admitted: AtomicU64::new(0),
            lockouts_total: AtomicU64::new(0),
            unlocks_total: AtomicU64::new(0),
            consecutive_lockouts: AtomicU64::new(0),
            state: AtomicU64::new(state_code(StateName::Initial)),
            templates_rendered: AtomicU64::new(0),
            template_failures: AtomicU64::new(0),
            publishes_dropped: AtomicU64::new(0),
            commands_spawned: AtomicU64::new(0),
            rfid_reads: AtomicU64::new(0),
            actuator_commands: AtomicU64::new(0),
            actuator_failures: AtomicU64::new(0),
            actuator_queue_delay: LatencyHistogram::new(),
            last_report: Mutex::new(ReportMark {
                at: Instant::now(),
                frames_total: 0,
                frame_latency: HistogramSnapshot::default(),
            }),
        }
    }

    pub fn record_frame_processed(&self, latency_us: u64) {
        self.frames_total.fetch_add(1, Ordering::Relaxed);
        self.frame_latency.observe(latency_us);
    }

    pub fn record_frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_match(&self, success: bool) {
        self.matches_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.matches_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_session(&self, admitted: bool) {
        self.sessions_total.fetch_add(1, Ordering::Relaxed);
        if admitted {
            self.sessions_admitted.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_lockout(&self, consecutive: u32) {
        self.lockouts_total.fetch_add(1, Ordering::Relaxed);
        self.set_consecutive_lockouts(consecutive);
    }

    pub fn record_unlock(&self) {
        self.unlocks_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_consecutive_lockouts(&self, count: u32) {
        self.consecutive_lockouts.store(count as u64, Ordering::Relaxed);
    }

    pub fn set_state(&self, state: StateName) {
        self.state.store(state_code(state), Ordering::Relaxed);
    }

    pub fn state(&self) -> u64 {
        self.state.load(Ordering::Relaxed)
    }

    pub fn record_template(&self, ok: bool) {
        let counter = if ok { &self.templates_rendered } else { &self.template_failures };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_dropped(&self) {
        self.publishes_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command_spawned(&self) {
        self.commands_spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rfid_read(&self) {
        self.rfid_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_actuator_command(&self, ok: bool) {
        self.actuator_commands.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.actuator_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_actuator_queue_delay(&self, delay_us: u64) {
        self.actuator_queue_delay.observe(delay_us);
    }

    pub fn frames_total(&self) -> u64 {
        self.frames_total.load(Ordering::Relaxed)
    }

    pub fn lockouts_total(&self) -> u64 {
        self.lockouts_total.load(Ordering::Relaxed)
    }

    pub fn consecutive_lockouts(&self) -> u64 {
        self.consecutive_lockouts.load(Ordering::Relaxed)
    }

    pub fn template_failures(&self) -> u64 {
        self.template_failures.load(Ordering::Relaxed)
    }

    /// Cumulative values since startup; resets nothing
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            frames_total: load(&self.frames_total),
            frames_dropped: load(&self.frames_dropped),
            frame_latency: self.frame_latency.snapshot(),
            matches_total: load(&self.matches_total),
            matches_failed: load(&self.matches_failed),
            sessions_total: load(&self.sessions_total),
            sessions_admitted: load(&self.sessions_admitted),
            lockouts_total: load(&self.lockouts_total),
            unlocks_total: load(&self.unlocks_total),
            consecutive_lockouts: load(&self.consecutive_lockouts),
            state: load(&self.state),
            templates_rendered: load(&self.templates_rendered),
            template_failures: load(&self.template_failures),
            publishes_dropped: load(&self.publishes_dropped),
            commands_spawned: load(&self.commands_spawned),
            rfid_reads: load(&self.rfid_reads),
            actuator_commands: load(&self.actuator_commands),
            actuator_failures: load(&self.actuator_failures),
            actuator_queue_delay: self.actuator_queue_delay.snapshot(),
        }
    }

    /// Snapshot plus the frame rate and latency of the period since the
    /// previous call
    pub fn report(&self) -> MetricsReport {
        let totals = self.snapshot();
        let mut mark = self.last_report.lock();

        let elapsed = mark.at.elapsed().as_secs_f64();
        let frames = totals.frames_total.saturating_sub(mark.frames_total);
        let period_latency = totals.frame_latency.since(&mark.frame_latency);

        *mark = ReportMark { at: Instant::now(), frames_total: totals.frames_total, frame_latency: totals.frame_latency };

        MetricsReport {
            frames_per_sec: if elapsed > 0.0 { frames as f64 / elapsed } else { 0.0 },
            period_latency,
            period_max_latency_us: self.frame_latency.take_max(),
            actuator_queue_delay_max_us: self.actuator_queue_delay.take_max(),
            totals,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub frames_total: u64,
    pub frames_dropped: u64,
    pub frame_latency: HistogramSnapshot,
    pub matches_total: u64,
    pub matches_failed: u64,
    pub sessions_total: u64,
    pub sessions_admitted: u64,
    pub lockouts_total: u64,
    pub unlocks_total: u64,
    pub consecutive_lockouts: u64,
    pub state: u64,
    pub templates_rendered: u64,
    pub template_failures: u64,
    pub publishes_dropped: u64,
    pub commands_spawned: u64,
    pub rfid_reads: u64,
    pub actuator_commands: u64,
    pub actuator_failures: u64,
    pub actuator_queue_delay: HistogramSnapshot,
}

#[derive(Debug, Clone)]
pub struct MetricsReport {
    pub totals: MetricsSnapshot,
    pub frames_per_sec: f64,
    pub period_latency: HistogramSnapshot,
    pub period_max_latency_us: u64,
    pub actuator_queue_delay_max_us: u64,
}

impl MetricsReport {
    pub fn log(&self) {
        let t = &self.totals;
        info!(
            frames_total = t.frames_total,
            frames_per_sec = format!("{:.1}", self.frames_per_sec),
            avg_latency_us = self.period_latency.mean_us(),
            p99_us = self.period_latency.quantile_us(0.99),
            max_latency_us = self.period_max_latency_us,
            sessions = t.sessions_total,
            admitted = t.sessions_admitted,
            lockouts = t.lockouts_total,
            consecutive = t.consecutive_lockouts,
            template_failures = t.template_failures,
            actuator_failures = t.actuator_failures,
            door_queue_max_us = self.actuator_queue_delay_max_us,
            "metrics"
        );
    }
}
