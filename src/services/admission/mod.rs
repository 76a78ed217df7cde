//! Admission controller - the door's decision loop
//!
//! The controller is the single owner of session and lockout state. It:
//! - Sequences frames into match sessions (Waiting -> Matching)
//! - Turns a finished session into KeepOpen or LockedOut
//! - Applies the lockout exit rules and the consecutive lockout fail-safe
//! - Drives the door through a non-blocking actuator handle
//! - Emits named events that the output dispatcher renders
//!
//! Frames, RFID reads and control messages all arrive over channels and are
//! handled one at a time, so no state is ever touched concurrently.

mod handlers;
#[cfg(test)]
mod tests;

use chrono::{DateTime, Local};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::domain::error::AdmissionError;
use crate::domain::match_group::{MatchGroup, MatchGroupTracker};
use crate::domain::timer::Timer;
use crate::domain::types::{AdmissionEvent, ControlMessage, Frame, LockoutMethod, RfidRead, StateName};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::services::actuator_worker::DoorHandle;
use crate::services::consecutive_guard::ConsecutiveLockoutGuard;
use crate::services::matcher::{Matcher, ObstructionDetector};
use crate::services::output::OutputDispatcher;
use crate::services::rfid_check::RfidCheck;
use crate::services::template::TranslatorContext;

/// Decision parameters shared with the template translator
#[derive(Debug, Clone)]
pub struct AdmissionSettings {
    pub matcher: String,
    pub match_threshold: f64,
    pub ok_matches_needed: usize,
    /// Seconds the door stays open after a successful session clears
    pub match_time: f64,
    /// Minimum seconds between match attempts in one session
    pub rematch_interval: f64,
    pub lockout_method: LockoutMethod,
    pub lockout_time: f64,
    pub max_consecutive: u32,
    pub consecutive_delay: f64,
    pub rfid_lock_on_invalid: bool,
    pub rfid_lock_time: f64,
    pub output_path: String,
    pub match_output_path: String,
    pub steps_output_path: String,
    pub obstruct_output_path: String,
    pub template_output_path: String,
    pub save_images: bool,
    pub save_obstruct: bool,
    pub save_steps: bool,
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            matcher: "remote".to_string(),
            match_threshold: 0.8,
            ok_matches_needed: 2,
            match_time: 0.0,
            rematch_interval: 0.0,
            lockout_method: LockoutMethod::TimerOnly,
            lockout_time: 30.0,
            max_consecutive: 0,
            consecutive_delay: 3.0,
            rfid_lock_on_invalid: false,
            rfid_lock_time: 2.0,
            output_path: ".".to_string(),
            match_output_path: "%output_path%".to_string(),
            steps_output_path: "%output_path%".to_string(),
            obstruct_output_path: "%output_path%".to_string(),
            template_output_path: "%output_path%".to_string(),
            save_images: false,
            save_obstruct: false,
            save_steps: false,
        }
    }
}

impl AdmissionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            matcher: config.matcher().to_string(),
            match_threshold: config.match_threshold(),
            ok_matches_needed: config.ok_matches_needed(),
            match_time: config.match_time(),
            rematch_interval: config.rematch_interval_ms() as f64 / 1000.0,
            lockout_method: config.lockout_method(),
            lockout_time: config.lockout_time(),
            max_consecutive: config.max_consecutive(),
            consecutive_delay: config.consecutive_delay(),
            rfid_lock_on_invalid: config.rfid_lock_on_invalid(),
            rfid_lock_time: config.rfid_lock_time(),
            output_path: config.output_path().to_string(),
            match_output_path: config.match_output_path().to_string(),
            steps_output_path: config.steps_output_path().to_string(),
            obstruct_output_path: config.obstruct_output_path().to_string(),
            template_output_path: config.template_output_path().to_string(),
            save_images: config.save_images(),
            save_obstruct: config.save_obstruct(),
            save_steps: config.save_steps(),
        }
    }

    /// Two lockouts starting within this many seconds count as consecutive
    pub fn consecutive_window(&self) -> f64 {
        self.lockout_time + self.consecutive_delay
    }
}

/// Why the control loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Stopped,
    FailSafeHalt { count: u32 },
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Stopped => 0,
            RunOutcome::FailSafeHalt { .. } => 2,
        }
    }

    /// The halt as an error, for reporting; `None` for a requested stop
    pub fn halt_error(&self) -> Option<AdmissionError> {
        match *self {
            RunOutcome::Stopped => None,
            RunOutcome::FailSafeHalt { count } => Some(AdmissionError::FailSafeHalt { count }),
        }
    }
}

/// Collaborators the controller drives
pub struct Collaborators {
    pub matcher: Box<dyn Matcher>,
    pub detector: Box<dyn ObstructionDetector>,
    pub door: DoorHandle,
    pub output: OutputDispatcher,
    pub rfid: RfidCheck,
}

pub struct AdmissionController {
    pub(crate) settings: Arc<AdmissionSettings>,
    pub(crate) state: StateName,
    pub(crate) prev_state: StateName,
    /// Cleared by a stop request or the fail-safe halt
    pub(crate) running: bool,
    /// Consecutive count that tripped the fail-safe, until force-unlocked
    pub(crate) halted: Option<u32>,
    pub(crate) tracker: MatchGroupTracker,
    pub(crate) guard: ConsecutiveLockoutGuard,
    pub(crate) rfid: RfidCheck,
    pub(crate) lockout_timer: Timer,
    pub(crate) rematch_timer: Timer,
    /// KeepOpen hold after the frame clears
    pub(crate) hold_timer: Timer,
    /// Delay before the RFID tag check in KeepOpen
    pub(crate) rfid_timer: Timer,
    pub(crate) matcher: Box<dyn Matcher>,
    pub(crate) detector: Box<dyn ObstructionDetector>,
    pub(crate) door: DoorHandle,
    pub(crate) output: OutputDispatcher,
    pub(crate) metrics: Arc<Metrics>,
    /// Events emitted while handling the latest input
    pub(crate) events: Vec<AdmissionEvent>,
}

impl AdmissionController {
    pub fn new(settings: AdmissionSettings, collaborators: Collaborators, metrics: Arc<Metrics>) -> Self {
        let guard = ConsecutiveLockoutGuard::new(settings.max_consecutive, settings.consecutive_window());
        let lockout_timer = Timer::new(settings.lockout_time);
        let rematch_timer = Timer::new(settings.rematch_interval);
        let hold_timer = Timer::new(settings.match_time);
        let rfid_timer = Timer::new(settings.rfid_lock_time);

        Self {
            settings: Arc::new(settings),
            state: StateName::Initial,
            prev_state: StateName::Initial,
            running: true,
            halted: None,
            tracker: MatchGroupTracker::new(),
            guard,
            rfid: collaborators.rfid,
            lockout_timer,
            rematch_timer,
            hold_timer,
            rfid_timer,
            matcher: collaborators.matcher,
            detector: collaborators.detector,
            door: collaborators.door,
            output: collaborators.output.with_metrics(metrics.clone()),
            metrics,
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> StateName {
        self.state
    }

    pub fn prev_state(&self) -> StateName {
        self.prev_state
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn halted(&self) -> Option<u32> {
        self.halted
    }

    pub fn group(&self) -> &MatchGroup {
        self.tracker.group()
    }

    pub fn consecutive_lockouts(&self) -> u32 {
        self.guard.count()
    }

    pub fn settings(&self) -> &AdmissionSettings {
        &self.settings
    }

    pub fn output(&self) -> &OutputDispatcher {
        &self.output
    }

    /// Events emitted while handling the most recent frame, read or message
    pub fn last_events(&self) -> &[AdmissionEvent] {
        &self.events
    }

    /// Read-only snapshot handed to templates
    pub fn context(&self, now: DateTime<Local>) -> TranslatorContext {
        TranslatorContext {
            state: self.state,
            prev_state: self.prev_state,
            group: self.tracker.group().clone(),
            rfid: self.rfid.clone(),
            settings: self.settings.clone(),
            now,
        }
    }

    /// Leave the initial state: unlock the door and start waiting
    pub fn start(&mut self, now: DateTime<Local>) {
        self.events.clear();
        info!(
            matcher = %self.matcher.name(),
            ok_matches_needed = self.settings.ok_matches_needed,
            lockout_method = %self.settings.lockout_method.as_str(),
            lockout_time = self.settings.lockout_time,
            max_consecutive = self.settings.max_consecutive,
            rfid = self.rfid.is_enabled(),
            "admission_started"
        );
        self.door.unlock();
        self.enter_waiting(now);
    }

    /// Feed one frame through the current state's handler
    pub fn process_frame(&mut self, frame: &Frame) {
        self.events.clear();
        if !self.running {
            debug!(state = %self.state, "frame_skipped_not_running");
            return;
        }

        let started = Instant::now();
        match self.state {
            StateName::Initial => {
                self.start(frame.captured_at);
                self.on_waiting(frame);
            }
            StateName::Waiting => self.on_waiting(frame),
            StateName::Matching => self.on_matching(frame),
            StateName::KeepOpen => self.on_keep_open(frame),
            StateName::LockedOut => self.on_locked_out(frame),
            StateName::Ignoring => {}
        }
        self.metrics.record_frame_processed(started.elapsed().as_micros() as u64);
    }

    pub fn handle_rfid(&mut self, read: &RfidRead, now: DateTime<Local>) {
        self.events.clear();
        if !self.rfid.is_configured(read.reader) {
            warn!(reader = %read.reader, "rfid_read_unconfigured_reader");
            return;
        }
        self.metrics.record_rfid_read();
        self.rfid.on_read(read);
        self.emit(AdmissionEvent::RfidDetect, now);
    }

    /// Apply one control message. Returns an outcome when the loop must end.
    pub fn handle_control(&mut self, msg: ControlMessage, now: DateTime<Local>) -> Option<RunOutcome> {
        self.events.clear();
        info!(message = %msg, state = %self.state, "control_message");

        match msg {
            ControlMessage::Stop => {
                self.running = false;
                return Some(RunOutcome::Stopped);
            }
            ControlMessage::ForceUnlock => self.force_unlock(now),
            ControlMessage::ForceLockout => self.start_lockout(now, false),
            ControlMessage::Ignore => self.set_state(StateName::Ignoring, now),
            ControlMessage::Attention => self.attention(now),
        }
        None
    }

    /// Run until stopped, the frame source closes, or the fail-safe trips
    pub async fn run(
        &mut self,
        mut frame_rx: mpsc::Receiver<Frame>,
        mut control_rx: mpsc::Receiver<ControlMessage>,
        mut rfid_rx: mpsc::Receiver<RfidRead>,
        mut shutdown: watch::Receiver<bool>,
    ) -> RunOutcome {
        self.start(Local::now());

        loop {
            // Pending control messages always win over the next frame
            while let Ok(msg) = control_rx.try_recv() {
                if let Some(outcome) = self.handle_control(msg, Local::now()) {
                    return outcome;
                }
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("admission_shutdown");
                        return RunOutcome::Stopped;
                    }
                }
                Some(msg) = control_rx.recv() => {
                    if let Some(outcome) = self.handle_control(msg, Local::now()) {
                        return outcome;
                    }
                }
                Some(read) = rfid_rx.recv() => {
                    self.handle_rfid(&read, Local::now());
                }
                frame = frame_rx.recv() => {
                    let Some(frame) = frame else {
                        info!("frame_source_closed");
                        return RunOutcome::Stopped;
                    };
                    self.process_frame(&frame);
                    if let Some(count) = self.halted {
                        return RunOutcome::FailSafeHalt { count };
                    }
                }
            }
        }
    }
}
