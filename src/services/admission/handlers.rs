//! State handlers for the admission controller
//!
//! One handler per state consumes a frame and applies at most one
//! transition. Door actuation, image persistence and event emission all
//! happen here so `mod.rs` stays a thin dispatcher.

use super::AdmissionController;
use crate::domain::match_group::MatchState;
use crate::domain::types::{AdmissionEvent, Frame, LockoutMethod, MatchResult, RfidReader, StateName};
use crate::services::consecutive_guard::GuardVerdict;
use crate::services::lockout_policy::{self, LockDecision, TimerAction};
use crate::services::rfid_check::RfidVerdict;
use bytes::Bytes;
use chrono::{DateTime, Local};
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Timestamp format used inside saved image filenames
const FILENAME_TIME_FORMAT: &str = "%Y-%m-%d_%H_%M_%S%.6f";

fn join_path(dir: &str, filename: &str) -> String {
    Path::new(dir).join(filename).to_string_lossy().into_owned()
}

impl AdmissionController {
    pub(crate) fn set_state(&mut self, next: StateName, now: DateTime<Local>) {
        if self.state == next {
            return;
        }
        self.prev_state = self.state;
        self.state = next;
        info!(from = %self.prev_state, to = %next, "state_change");
        self.metrics.set_state(next);
        self.emit(AdmissionEvent::StateChange, now);
    }

    /// Record the event and let matching templates render it
    pub(crate) fn emit(&mut self, event: AdmissionEvent, now: DateTime<Local>) {
        self.events.push(event);
        if !self.output.wants(event.as_str()) {
            return;
        }
        let ctx = self.context(now);
        let outputs = self.output.generate(event.as_str(), &ctx);
        debug!(event = %event, outputs = outputs.len(), "event_dispatched");
    }

    fn obstructed(&mut self, frame: &Frame) -> bool {
        match self.detector.is_obstructed(frame) {
            Ok(obstructed) => obstructed,
            Err(e) => {
                warn!(error = %e, "obstruction_check_failed");
                false
            }
        }
    }

    /// Render an output directory template, falling back to the base path
    fn render_dir(&self, raw: &str, now: DateTime<Local>) -> String {
        let ctx = self.context(now);
        match self.output.render_with(raw, &ctx) {
            Ok(dir) => dir,
            Err(e) => {
                warn!(template = %raw, error = %e, "output_path_render_failed");
                self.settings.output_path.clone()
            }
        }
    }

    pub(crate) fn enter_waiting(&mut self, now: DateTime<Local>) {
        self.rematch_timer.reset();
        self.hold_timer.reset();
        self.rfid_timer.reset();
        self.rfid.clear_reads();
        self.set_state(StateName::Waiting, now);
    }

    pub(crate) fn on_waiting(&mut self, frame: &Frame) {
        if !self.obstructed(frame) {
            return;
        }
        let now = frame.captured_at;
        self.start_session(frame);
        self.emit(AdmissionEvent::FrameObstructed, now);
        self.set_state(StateName::Matching, now);
    }

    fn start_session(&mut self, frame: &Frame) {
        let now = frame.captured_at;
        self.tracker.start_session("", frame.image.clone(), now);

        if self.settings.save_obstruct {
            let dir = self.render_dir(&self.settings.obstruct_output_path, now);
            let filename = format!("match_obstruct_{}.png", now.format(FILENAME_TIME_FORMAT));
            let obstruct = &mut self.tracker.group_mut().obstruct;
            obstruct.full_path = join_path(&dir, &filename);
            obstruct.path = dir;
            obstruct.filename = filename;
        }

        info!(group_id = %self.tracker.group().id, "session_started");
    }

    pub(crate) fn on_matching(&mut self, frame: &Frame) {
        let now = frame.captured_at;
        if self.rematch_timer.is_active() && !self.rematch_timer.has_timed_out(now) {
            return;
        }

        if !self.obstructed(frame) {
            if self.tracker.group().count() == 0 {
                info!("session_abandoned");
                self.enter_waiting(now);
            } else {
                self.finish_session(now);
            }
            return;
        }

        if !self.match_frame(frame) {
            self.finish_session(now);
            return;
        }

        let group = self.tracker.group();
        if group.is_full() {
            self.finish_session(now);
        } else if group.failure_is_certain(self.settings.ok_matches_needed) {
            debug!(
                count = group.count(),
                success_count = group.success_count,
                "session_decided_early"
            );
            self.finish_session(now);
        }
    }

    /// Run the matcher on `frame` and record the attempt. False if the
    /// session had no room left.
    fn match_frame(&mut self, frame: &Frame) -> bool {
        let now = frame.captured_at;
        let result = match self.matcher.match_frame(frame) {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, matcher = %self.matcher.name(), "matcher_failed");
                MatchResult::failed(e.to_string())
            }
        };
        self.metrics.record_match(result.success);

        let mut state = MatchState::new(now, frame.image.clone(), result);
        if self.settings.save_images {
            self.assign_image_paths(&mut state, self.tracker.group().count() + 1, now);
        }

        let (score, success, direction) = match self.tracker.record(state) {
            Ok(m) => (m.result.score, m.result.success, m.result.direction),
            Err(e) => {
                error!(error = %e, "match_rejected");
                return false;
            }
        };
        info!(
            index = self.tracker.group().count(),
            score = format!("{:.3}", score),
            success = success,
            direction = %direction,
            "match_attempt"
        );

        self.rematch_timer.set(self.settings.rematch_interval);
        self.rematch_timer.start(now);
        self.emit(AdmissionEvent::Match, now);
        true
    }

    fn assign_image_paths(&self, state: &mut MatchState, index: usize, now: DateTime<Local>) {
        let dir = self.render_dir(&self.settings.match_output_path, now);
        let base = format!(
            "match_{}{}__{}",
            if state.result.success { "" } else { "fail_" },
            state.time.format(FILENAME_TIME_FORMAT),
            index
        );
        state.filename = format!("{base}.png");
        state.full_path = join_path(&dir, &state.filename);
        state.path = dir;

        if !self.settings.save_steps {
            return;
        }
        let steps_dir = self.render_dir(&self.settings.steps_output_path, now);
        for (j, step) in state.result.steps_mut().iter_mut().enumerate() {
            step.filename = format!("{base}_{j:02}_{}.png", step.name);
            step.full_path = join_path(&steps_dir, &step.filename);
            step.path = steps_dir.clone();
        }
    }

    pub(crate) fn finish_session(&mut self, now: DateTime<Local>) {
        let group = self.tracker.finalize(self.settings.ok_matches_needed, now);
        let admitted = group.success;
        info!(
            group_id = %group.id,
            count = group.count(),
            success_count = group.success_count,
            final_decision = group.final_decision,
            direction = %group.direction,
            description = %group.description,
            "session_done"
        );

        self.emit(AdmissionEvent::MatchDone, now);
        self.save_images(now);
        self.emit(AdmissionEvent::MatchGroupDone, now);

        if admitted {
            self.metrics.record_session(true);
            self.admit(now);
        } else if self.rfid_overrides(now) {
            self.metrics.record_session(true);
            self.admit(now);
            self.rfid.mark_checked();
        } else {
            self.metrics.record_session(false);
            self.start_lockout(now, true);
        }
    }

    /// A valid tag or outbound RFID travel can admit a failed image match
    fn rfid_overrides(&mut self, now: DateTime<Local>) -> bool {
        if !self.settings.rfid_lock_on_invalid || !self.rfid.is_enabled() {
            return false;
        }
        self.emit(AdmissionEvent::RfidMatch, now);
        let permit = self.rfid.verdict() == RfidVerdict::Permit;
        if permit {
            info!(direction = %self.rfid.direction(), "rfid_override_unlock");
        }
        permit
    }

    fn save_images(&mut self, now: DateTime<Local>) {
        let group = self.tracker.group();
        let mut writes: Vec<(String, Bytes)> = Vec::new();

        if self.settings.save_obstruct && !group.obstruct.full_path.is_empty() {
            writes.push((group.obstruct.full_path.clone(), group.obstruct.image.clone()));
        }

        let mut saved_matches = 0;
        if self.settings.save_images {
            for m in group.matches() {
                if m.full_path.is_empty() {
                    continue;
                }
                writes.push((m.full_path.clone(), m.image.clone()));
                saved_matches += 1;
                if self.settings.save_steps {
                    for step in m.result.steps() {
                        if let (Some(image), false) = (&step.image, step.full_path.is_empty()) {
                            writes.push((step.full_path.clone(), image.clone()));
                        }
                    }
                }
            }
        }

        for (path, image) in &writes {
            info!(path = %path, "image_saved");
            self.output.writer().write(Path::new(path), image);
        }
        for _ in 0..saved_matches {
            self.emit(AdmissionEvent::SaveImg, now);
        }
    }

    fn admit(&mut self, now: DateTime<Local>) {
        if self.guard.count() > 0 {
            debug!(previous = self.guard.count(), "consecutive_lockout_reset");
        }
        self.guard.reset();
        self.metrics.set_consecutive_lockouts(0);
        self.rfid.rearm();
        self.door.unlock();
        self.hold_timer.set(self.settings.match_time);
        self.hold_timer.reset();
        self.rfid_timer.set(self.settings.rfid_lock_time);
        self.rfid_timer.start(now);
        self.set_state(StateName::KeepOpen, now);
    }

    fn rfid_check_pending(&self) -> bool {
        self.settings.rfid_lock_on_invalid && self.rfid.is_enabled() && !self.rfid.checked()
    }

    pub(crate) fn on_keep_open(&mut self, frame: &Frame) {
        let now = frame.captured_at;

        if self.rfid_check_pending() && self.rfid_timer.has_timed_out(now) {
            self.rfid.mark_checked();
            self.emit(AdmissionEvent::RfidMatch, now);
            let verdict = self.rfid.verdict();
            info!(
                verdict = ?verdict,
                direction = %self.rfid.direction(),
                inner_tag = %self.rfid.reader(RfidReader::Inner).tag,
                outer_tag = %self.rfid.reader(RfidReader::Outer).tag,
                "rfid_check"
            );
            if verdict == RfidVerdict::Deny {
                warn!("rfid_lockout");
                self.start_lockout(now, true);
                return;
            }
        }

        // An obstruction here is the animal passing through, not a new session
        if !self.obstructed(frame) && !self.hold_timer.is_active() {
            self.hold_timer.start(now);
        }

        if self.hold_timer.has_timed_out(now) && !self.rfid_check_pending() {
            self.enter_waiting(now);
        }
    }

    /// Lock the door. `counted` lockouts feed the consecutive guard.
    pub(crate) fn start_lockout(&mut self, now: DateTime<Local>, counted: bool) {
        self.door.lock();
        self.lockout_timer.set(self.settings.lockout_time);
        if lockout_policy::starts_timer_on_entry(self.settings.lockout_method) {
            self.lockout_timer.start(now);
        } else {
            self.lockout_timer.reset();
        }

        let verdict = if counted {
            let verdict = self.guard.on_lockout(now);
            self.metrics.set_consecutive_lockouts(self.guard.count());
            Some(verdict)
        } else {
            None
        };
        self.metrics.record_lockout(self.guard.count());

        self.set_state(StateName::LockedOut, now);
        info!(
            method = %self.settings.lockout_method.as_str(),
            lockout_time = self.settings.lockout_time,
            consecutive = self.guard.count(),
            forced = !counted,
            "lockout_started"
        );
        self.emit(AdmissionEvent::LockedOut, now);

        if let Some(GuardVerdict::Halt(count)) = verdict {
            self.fail_safe_halt(count, now);
        }
    }

    fn fail_safe_halt(&mut self, count: u32, now: DateTime<Local>) {
        error!(
            count = count,
            max = self.guard.max_count(),
            window_secs = self.guard.window_secs(),
            "fail_safe_halt"
        );
        self.door.unlock();
        self.lockout_timer.reset();
        self.enter_waiting(now);
        self.running = false;
        self.halted = Some(count);
        self.emit(AdmissionEvent::FailSafeHalt, now);
    }

    pub(crate) fn on_locked_out(&mut self, frame: &Frame) {
        let now = frame.captured_at;
        let method = self.settings.lockout_method;
        let obstructed = match method {
            LockoutMethod::TimerOnly => false,
            _ => self.obstructed(frame),
        };

        let step = lockout_policy::decide(
            method,
            obstructed,
            self.lockout_timer.elapsed(now),
            self.settings.lockout_time,
        );
        match step.timer {
            TimerAction::Keep => {}
            TimerAction::Start => self.lockout_timer.start(now),
            TimerAction::Stop => {
                if self.lockout_timer.is_active() {
                    debug!("lockout_timer_restarted");
                }
                self.lockout_timer.reset();
            }
        }

        if step.decision == LockDecision::Unlock {
            self.end_lockout(now);
        }
    }

    fn end_lockout(&mut self, now: DateTime<Local>) {
        info!(
            elapsed = self.lockout_timer.elapsed(now).unwrap_or(0.0),
            "lockout_ended"
        );
        self.door.unlock();
        self.metrics.record_unlock();
        self.lockout_timer.reset();
        self.enter_waiting(now);
        self.emit(AdmissionEvent::Unlocked, now);
    }

    /// Returns to `Waiting` from any state. A running lockout ends with the door unlocked.
    pub(crate) fn attention(&mut self, now: DateTime<Local>) {
        if self.state == StateName::LockedOut {
            self.end_lockout(now);
        } else {
            self.enter_waiting(now);
        }
    }

    pub(crate) fn force_unlock(&mut self, now: DateTime<Local>) {
        self.guard.reset();
        self.metrics.set_consecutive_lockouts(0);
        if self.halted.take().is_some() {
            info!("fail_safe_cleared");
        }
        self.running = true;

        let was_locked = self.state == StateName::LockedOut;
        self.door.unlock();
        self.lockout_timer.reset();
        self.enter_waiting(now);
        if was_locked {
            self.metrics.record_unlock();
            self.emit(AdmissionEvent::Unlocked, now);
        }
    }
}
