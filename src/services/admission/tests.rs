//! Tests for the admission controller

use super::*;
use crate::domain::types::{FrameReport, MatchDirection, RfidReader};
use crate::io::output_writer::OutputWriter;
use crate::services::actuator::DoorCommand;
use crate::services::actuator_worker::DoorCmd;
use crate::services::matcher::{RemoteMatcher, ReportObstruction};
use bytes::Bytes;
use chrono::{Duration, TimeZone};
use std::fs;
use std::path::Path;
use tempfile::tempdir;
use AdmissionEvent::*;

/// Test harness that keeps the door receiver alive so `try_send` succeeds
struct Harness {
    ctl: AdmissionController,
    door_rx: mpsc::Receiver<DoorCmd>,
    t0: DateTime<Local>,
}

impl std::ops::Deref for Harness {
    type Target = AdmissionController;
    fn deref(&self) -> &Self::Target {
        &self.ctl
    }
}

impl std::ops::DerefMut for Harness {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.ctl
    }
}

fn no_rfid() -> RfidCheck {
    RfidCheck::new(false, false, Vec::new())
}

fn settings() -> AdmissionSettings {
    AdmissionSettings { lockout_time: 2.0, ..AdmissionSettings::default() }
}

fn harness(settings: AdmissionSettings) -> Harness {
    harness_with(settings, no_rfid(), OutputDispatcher::new(OutputWriter::dry_run()))
}

fn controller(
    settings: AdmissionSettings,
    rfid: RfidCheck,
    output: OutputDispatcher,
) -> (AdmissionController, mpsc::Receiver<DoorCmd>) {
    let (door_tx, door_rx) = mpsc::channel(64);
    let collaborators = Collaborators {
        matcher: Box::new(RemoteMatcher::new(settings.match_threshold)),
        detector: Box::new(ReportObstruction),
        door: DoorHandle::new(door_tx),
        output,
        rfid,
    };
    let ctl = AdmissionController::new(settings, collaborators, Arc::new(Metrics::new()));
    (ctl, door_rx)
}

fn harness_with(settings: AdmissionSettings, rfid: RfidCheck, output: OutputDispatcher) -> Harness {
    let (mut ctl, door_rx) = controller(settings, rfid, output);
    let t0 = Local.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    ctl.start(t0);
    let mut h = Harness { ctl, door_rx, t0 };
    h.door();
    h
}

fn frame_at(t: DateTime<Local>, obstructed: bool, score: Option<f64>, direction: MatchDirection) -> Frame {
    Frame::new(t, Bytes::from(format!("frame-{}", t.timestamp_micros()))).with_report(FrameReport {
        obstructed,
        score,
        direction,
        ..Default::default()
    })
}

impl Harness {
    fn at(&self, secs: f64) -> DateTime<Local> {
        self.t0 + Duration::milliseconds((secs * 1000.0).round() as i64)
    }

    fn frame_dir(&mut self, secs: f64, score: Option<f64>, direction: MatchDirection) {
        let frame = frame_at(self.at(secs), true, score, direction);
        self.ctl.process_frame(&frame);
    }

    fn frame(&mut self, secs: f64, score: Option<f64>) {
        self.frame_dir(secs, score, MatchDirection::In);
    }

    fn clear(&mut self, secs: f64) {
        let frame = frame_at(self.at(secs), false, None, MatchDirection::Unknown);
        self.ctl.process_frame(&frame);
    }

    /// Obstruct at `start`, then one attempt per score 0.1s apart until the
    /// session is decided. Returns the time of the deciding frame.
    fn session(&mut self, start: f64, scores: &[f64]) -> f64 {
        self.frame(start, None);
        assert_eq!(self.state(), StateName::Matching);
        let mut t = start;
        for (i, score) in scores.iter().enumerate() {
            t = start + 0.1 * (i as f64 + 1.0);
            self.frame(t, Some(*score));
            if self.state() != StateName::Matching {
                break;
            }
        }
        t
    }

    fn door(&mut self) -> Vec<DoorCommand> {
        let mut seen = Vec::new();
        while let Ok(cmd) = self.door_rx.try_recv() {
            seen.push(cmd.command);
        }
        seen
    }
}

// --- Session lifecycle ---

#[test]
fn test_start_unlocks_and_waits() {
    let (mut ctl, mut door_rx) = controller(settings(), no_rfid(), OutputDispatcher::new(OutputWriter::dry_run()));
    assert_eq!(ctl.state(), StateName::Initial);

    ctl.start(Local::now());
    assert_eq!(ctl.state(), StateName::Waiting);
    assert_eq!(ctl.prev_state(), StateName::Initial);
    assert_eq!(door_rx.try_recv().unwrap().command, DoorCommand::Unlock);
    assert_eq!(ctl.last_events(), &[StateChange]);
}

#[test]
fn test_clear_frames_keep_waiting() {
    let mut h = harness(settings());
    h.clear(0.0);
    h.clear(0.1);
    assert_eq!(h.state(), StateName::Waiting);
    assert!(h.last_events().is_empty());
}

#[test]
fn test_obstruction_starts_session() {
    let mut h = harness(settings());
    h.frame(0.0, None);
    assert_eq!(h.state(), StateName::Matching);
    assert_eq!(h.last_events(), &[FrameObstructed, StateChange]);
    assert_eq!(h.group().count(), 0);
    assert_eq!(h.group().start_time, Some(h.at(0.0)));
}

#[test]
fn test_successful_session_keeps_open_then_waits() {
    let mut h = harness(settings());
    h.session(0.0, &[0.9, 0.3, 0.9, 0.9]);

    assert_eq!(h.state(), StateName::KeepOpen);
    let group = h.group();
    assert_eq!(group.count(), 4);
    assert_eq!(group.success_count, 3);
    assert!(group.final_decision);
    assert!(group.success);
    assert_eq!(group.direction, MatchDirection::In);
    assert_eq!(group.description, "Everything OK!");
    assert_eq!(h.last_events(), &[Match, MatchDone, MatchGroupDone, StateChange]);
    assert_eq!(h.door(), vec![DoorCommand::Unlock]);

    h.clear(0.5);
    assert_eq!(h.state(), StateName::Waiting);
    assert_eq!(h.prev_state(), StateName::KeepOpen);
}

#[test]
fn test_failed_session_locks_out_until_timer() {
    let mut h = harness(settings());
    let locked_at = h.session(0.0, &[0.9, 0.3, 0.3, 0.3]);

    assert_eq!(h.state(), StateName::LockedOut);
    assert_eq!(h.group().success_count, 1);
    assert!(!h.group().final_decision);
    assert_eq!(h.group().description, "Lockout 3 of 4 matches failed");
    assert!(h.last_events().contains(&LockedOut));
    assert_eq!(h.door(), vec![DoorCommand::Lock]);

    h.clear(locked_at + 1.0);
    assert_eq!(h.state(), StateName::LockedOut);

    // Timer-only ignores the obstruction on the unlocking frame
    h.frame(locked_at + 2.0, None);
    assert_eq!(h.state(), StateName::Waiting);
    assert!(h.last_events().contains(&Unlocked));
    assert_eq!(h.door(), vec![DoorCommand::Unlock]);
    assert_eq!(h.metrics.lockouts_total(), 1);
}

#[test]
fn test_certain_failure_ends_session_early() {
    let mut h = harness(settings());
    h.session(0.0, &[0.3, 0.3, 0.3, 0.9]);
    assert_eq!(h.state(), StateName::LockedOut);
    assert_eq!(h.group().count(), 3);
}

#[test]
fn test_clear_frame_ends_session() {
    let mut h = harness(settings());
    h.frame(0.0, None);
    h.frame(0.1, Some(0.9));
    h.frame(0.2, Some(0.95));
    h.clear(0.3);
    assert_eq!(h.state(), StateName::KeepOpen);
    assert_eq!(h.group().count(), 2);
    assert_eq!(h.group().end_time, Some(h.at(0.3)));
}

#[test]
fn test_abandoned_session_returns_to_waiting() {
    let mut h = harness(settings());
    h.frame(0.0, None);
    h.clear(0.1);
    assert_eq!(h.state(), StateName::Waiting);
    assert!(!h.last_events().contains(&MatchDone));
    assert!(h.door().is_empty());
}

#[test]
fn test_outbound_session_is_admitted() {
    let mut h = harness(settings());
    h.frame(0.0, None);
    for i in 1..=4 {
        h.frame_dir(0.1 * i as f64, Some(0.1), MatchDirection::Out);
    }
    assert_eq!(h.state(), StateName::KeepOpen);
    assert_eq!(h.group().direction, MatchDirection::Out);
    assert_eq!(h.group().description, "Going out");
    assert!(!h.group().final_decision);
}

#[test]
fn test_matcher_error_counts_as_failure() {
    let mut h = harness(settings());
    h.frame(0.0, None);
    // No score in the report: the matcher errors
    h.frame(0.1, None);
    h.frame(0.2, None);
    h.frame(0.3, None);
    assert_eq!(h.state(), StateName::LockedOut);
    assert_eq!(h.group().success_count, 0);
    assert!(h.group().matches()[0].result.description.contains("no score"));
}

#[test]
fn test_rematch_interval_throttles_attempts() {
    let mut h = harness(AdmissionSettings { rematch_interval: 0.5, ..settings() });
    h.frame(0.0, None);
    h.frame(0.1, Some(0.9));
    h.frame(0.2, Some(0.9));
    assert_eq!(h.group().count(), 1);
    h.frame(0.6, Some(0.9));
    assert_eq!(h.group().count(), 2);
}

#[test]
fn test_keep_open_hold_and_benign_obstruction() {
    let mut h = harness(AdmissionSettings { match_time: 2.0, ..settings() });
    h.session(0.0, &[0.9, 0.9, 0.9, 0.9]);
    let id = h.group().id;

    h.frame(1.0, None);
    assert_eq!(h.state(), StateName::KeepOpen);
    assert_eq!(h.group().id, id);

    h.clear(1.5);
    h.clear(3.0);
    assert_eq!(h.state(), StateName::KeepOpen);
    h.clear(3.5);
    assert_eq!(h.state(), StateName::Waiting);
}

// --- Lockout methods ---

#[test]
fn test_obstruct_or_timer_unlocks_on_clear() {
    let mut h = harness(AdmissionSettings { lockout_method: LockoutMethod::ObstructOrTimer, ..settings() });
    let locked_at = h.session(0.0, &[0.3, 0.3, 0.3]);
    h.frame(locked_at + 0.5, None);
    assert_eq!(h.state(), StateName::LockedOut);
    h.clear(locked_at + 0.6);
    assert_eq!(h.state(), StateName::Waiting);
}

#[test]
fn test_obstruct_or_timer_unlocks_on_timer() {
    let mut h = harness(AdmissionSettings { lockout_method: LockoutMethod::ObstructOrTimer, ..settings() });
    let locked_at = h.session(0.0, &[0.3, 0.3, 0.3]);
    h.frame(locked_at + 1.9, None);
    assert_eq!(h.state(), StateName::LockedOut);
    h.frame(locked_at + 2.0, None);
    assert_eq!(h.state(), StateName::Waiting);
}

#[test]
fn test_obstruct_then_timer_waits_for_clear_view() {
    let mut h = harness(AdmissionSettings { lockout_method: LockoutMethod::ObstructThenTimer, ..settings() });
    h.session(0.0, &[0.3, 0.3, 0.3]);

    // Obstructed long past the lockout time: timer never started
    h.frame(5.0, None);
    assert_eq!(h.state(), StateName::LockedOut);

    h.clear(6.0);
    h.clear(7.0);
    assert_eq!(h.state(), StateName::LockedOut);

    // Re-obstruction restarts the wait
    h.frame(7.5, None);
    h.clear(8.0);
    h.clear(9.9);
    assert_eq!(h.state(), StateName::LockedOut);
    h.clear(10.0);
    assert_eq!(h.state(), StateName::Waiting);
}

// --- Consecutive lockout guard ---

fn guard_settings() -> AdmissionSettings {
    AdmissionSettings { lockout_time: 1.0, consecutive_delay: 3.0, max_consecutive: 3, ..AdmissionSettings::default() }
}

#[test]
fn test_three_close_lockouts_halt() {
    let mut h = harness(guard_settings());

    let t = h.session(0.0, &[0.3, 0.3, 0.3]);
    assert_eq!(h.consecutive_lockouts(), 1);
    h.clear(t + 1.0);
    assert_eq!(h.state(), StateName::Waiting);

    let t = h.session(1.5, &[0.3, 0.3, 0.3]);
    assert_eq!(h.consecutive_lockouts(), 2);
    h.clear(t + 1.0);
    h.door();

    h.session(3.0, &[0.3, 0.3, 0.3]);
    assert_eq!(h.consecutive_lockouts(), 3);
    assert!(!h.is_running());
    assert_eq!(h.halted(), Some(3));
    assert_eq!(h.state(), StateName::Waiting);
    assert!(h.last_events().contains(&LockedOut));
    assert_eq!(h.last_events().last(), Some(&FailSafeHalt));
    assert_eq!(h.door(), vec![DoorCommand::Lock, DoorCommand::Unlock]);

    // Halted: frames are not processed
    h.frame(4.0, None);
    assert_eq!(h.state(), StateName::Waiting);
    assert!(h.last_events().is_empty());
}

#[test]
fn test_force_unlock_rearms_after_halt() {
    let mut h = harness(AdmissionSettings { max_consecutive: 1, ..guard_settings() });
    h.session(0.0, &[0.3, 0.3, 0.3]);
    assert_eq!(h.halted(), Some(1));

    let now = h.at(1.0);
    assert_eq!(h.handle_control(ControlMessage::ForceUnlock, now), None);
    assert!(h.is_running());
    assert_eq!(h.halted(), None);
    assert_eq!(h.consecutive_lockouts(), 0);

    h.session(2.0, &[0.9, 0.9, 0.9, 0.9]);
    assert_eq!(h.state(), StateName::KeepOpen);
}

#[test]
fn test_success_resets_consecutive_count() {
    let mut h = harness(guard_settings());
    let t = h.session(0.0, &[0.3, 0.3, 0.3]);
    h.clear(t + 1.0);
    let t = h.session(1.5, &[0.3, 0.3, 0.3]);
    h.clear(t + 1.0);
    assert_eq!(h.consecutive_lockouts(), 2);

    let t = h.session(3.0, &[0.9, 0.9, 0.9, 0.9]);
    assert_eq!(h.consecutive_lockouts(), 0);
    h.clear(t + 0.1);

    h.session(4.0, &[0.3, 0.3, 0.3]);
    assert_eq!(h.consecutive_lockouts(), 1);
    assert!(h.is_running());
}

#[test]
fn test_lockouts_outside_window_restart_count() {
    let mut h = harness(guard_settings());
    let t = h.session(0.0, &[0.3, 0.3, 0.3]);
    h.clear(t + 1.0);
    // Window is lockout_time + consecutive_delay = 4s
    h.session(10.0, &[0.3, 0.3, 0.3]);
    assert_eq!(h.consecutive_lockouts(), 1);
}

// --- Control messages ---

#[test]
fn test_force_lockout_is_not_counted() {
    let mut h = harness(guard_settings());
    let now = h.at(0.0);
    h.handle_control(ControlMessage::ForceLockout, now);
    assert_eq!(h.state(), StateName::LockedOut);
    assert_eq!(h.consecutive_lockouts(), 0);
    assert_eq!(h.door(), vec![DoorCommand::Lock]);

    h.clear(1.0);
    assert_eq!(h.state(), StateName::Waiting);
}

#[test]
fn test_force_unlock_ends_lockout() {
    let mut h = harness(settings());
    h.session(0.0, &[0.3, 0.3, 0.3]);
    h.door();

    let now = h.at(0.5);
    h.handle_control(ControlMessage::ForceUnlock, now);
    assert_eq!(h.state(), StateName::Waiting);
    assert!(h.last_events().contains(&Unlocked));
    assert_eq!(h.door(), vec![DoorCommand::Unlock]);
}

#[test]
fn test_ignore_and_attention() {
    let mut h = harness(settings());
    let now = h.at(0.0);
    h.handle_control(ControlMessage::Ignore, now);
    assert_eq!(h.state(), StateName::Ignoring);

    h.frame(0.1, None);
    assert_eq!(h.state(), StateName::Ignoring);

    let now = h.at(0.2);
    h.handle_control(ControlMessage::Attention, now);
    assert_eq!(h.state(), StateName::Waiting);
    h.frame(0.3, None);
    assert_eq!(h.state(), StateName::Matching);
}

#[test]
fn test_attention_returns_to_waiting_from_any_state() {
    let mut h = harness(settings());
    h.frame(0.0, None);
    assert_eq!(h.state(), StateName::Matching);

    let now = h.at(0.1);
    h.handle_control(ControlMessage::Attention, now);
    assert_eq!(h.state(), StateName::Waiting);

    h.session(1.0, &[0.3, 0.3, 0.3]);
    assert_eq!(h.state(), StateName::LockedOut);
    h.door();

    let now = h.at(1.5);
    h.handle_control(ControlMessage::Attention, now);
    assert_eq!(h.state(), StateName::Waiting);
    assert!(h.last_events().contains(&Unlocked));
    assert_eq!(h.door(), vec![DoorCommand::Unlock]);
}

#[test]
fn test_stop_message() {
    let mut h = harness(settings());
    let now = h.at(0.0);
    assert_eq!(h.handle_control(ControlMessage::Stop, now), Some(RunOutcome::Stopped));
    assert!(!h.is_running());
    h.frame(0.1, None);
    assert_eq!(h.state(), StateName::Waiting);
}

// --- RFID cross-check ---

fn rfid_settings() -> AdmissionSettings {
    AdmissionSettings { rfid_lock_on_invalid: true, rfid_lock_time: 1.0, match_time: 5.0, ..settings() }
}

fn inner_rfid() -> RfidCheck {
    RfidCheck::new(true, false, vec!["999_000000001007".to_string()])
}

fn read(reader: RfidReader, tag: &str) -> RfidRead {
    RfidRead { reader, tag: tag.to_string(), complete: true }
}

#[test]
fn test_missing_tag_locks_out_after_delay() {
    let mut h = harness_with(rfid_settings(), inner_rfid(), OutputDispatcher::new(OutputWriter::dry_run()));
    h.session(0.0, &[0.9, 0.9, 0.9, 0.9]);
    assert_eq!(h.state(), StateName::KeepOpen);

    h.clear(0.9);
    assert_eq!(h.state(), StateName::KeepOpen);

    h.clear(1.4);
    assert_eq!(h.state(), StateName::LockedOut);
    assert!(h.last_events().contains(&RfidMatch));
    assert_eq!(h.consecutive_lockouts(), 1);
}

#[test]
fn test_valid_tag_overrides_failed_images() {
    let mut h = harness_with(rfid_settings(), inner_rfid(), OutputDispatcher::new(OutputWriter::dry_run()));
    let now = h.at(0.0);
    h.handle_rfid(&read(RfidReader::Inner, "999_000000001007"), now);
    assert_eq!(h.last_events(), &[RfidDetect]);

    h.session(0.1, &[0.3, 0.3, 0.3]);
    assert_eq!(h.state(), StateName::KeepOpen);
    assert!(h.last_events().contains(&RfidMatch));

    // Already checked for this session
    h.clear(2.0);
    assert!(!h.last_events().contains(&RfidMatch));
}

#[test]
fn test_valid_tag_ignored_without_lock_on_invalid() {
    let mut h = harness_with(
        AdmissionSettings { rfid_lock_on_invalid: false, ..rfid_settings() },
        inner_rfid(),
        OutputDispatcher::new(OutputWriter::dry_run()),
    );
    let now = h.at(0.0);
    h.handle_rfid(&read(RfidReader::Inner, "999_000000001007"), now);
    h.session(0.1, &[0.3, 0.3, 0.3]);
    assert_eq!(h.state(), StateName::LockedOut);
}

#[test]
fn test_unconfigured_reader_ignored() {
    let mut h = harness_with(rfid_settings(), inner_rfid(), OutputDispatcher::new(OutputWriter::dry_run()));
    let now = h.at(0.0);
    h.handle_rfid(&read(RfidReader::Outer, "999_000000001007"), now);
    assert!(h.last_events().is_empty());
}

// --- Outputs ---

#[test]
fn test_templates_render_on_events() {
    let dir = tempdir().unwrap();
    let out_dir = dir.path().to_string_lossy().into_owned();
    let mut output = OutputDispatcher::new(OutputWriter::new());
    output
        .add_template(
            "%!event match_done\n%match_group_success_count% %match_group_final_decision% %state% %match_group_id:8%",
            "[done]done.txt",
        )
        .unwrap();
    output.add_template("%!event match_done\n%bogus%", "[bad]bad.txt").unwrap();

    let mut h = harness_with(
        AdmissionSettings { output_path: out_dir, ..settings() },
        no_rfid(),
        output,
    );
    h.session(0.0, &[0.9, 0.3, 0.9, 0.9]);

    let body = fs::read_to_string(dir.path().join("done.txt")).unwrap();
    assert_eq!(body, format!("3 1 Matching {}", h.group().id.truncated(8)));
    assert!(!dir.path().join("bad.txt").exists());
    assert_eq!(h.metrics.template_failures(), 1);
}

#[test]
fn test_images_saved_at_session_end() {
    let dir = tempdir().unwrap();
    let mut h = harness_with(
        AdmissionSettings {
            output_path: dir.path().to_string_lossy().into_owned(),
            match_output_path: "%output_path%/matches".to_string(),
            save_images: true,
            save_obstruct: true,
            ..settings()
        },
        no_rfid(),
        OutputDispatcher::new(OutputWriter::new()),
    );
    h.session(0.0, &[0.9, 0.3, 0.9, 0.9]);

    assert_eq!(h.last_events().iter().filter(|e| **e == SaveImg).count(), 4);

    let obstruct = &h.group().obstruct;
    assert!(obstruct.filename.starts_with("match_obstruct_"));
    assert!(Path::new(&obstruct.full_path).exists());

    let matches = h.group().matches();
    assert!(matches[1].filename.starts_with("match_fail_"));
    assert!(matches[3].filename.ends_with("__4.png"));
    for m in matches {
        assert!(m.path.ends_with("matches"));
        assert_eq!(fs::read(&m.full_path).unwrap(), m.image.to_vec());
    }
}

// --- Control loop ---

#[tokio::test]
async fn test_run_drains_control_before_frames() {
    let (mut ctl, _door_rx) = controller(settings(), no_rfid(), OutputDispatcher::new(OutputWriter::dry_run()));
    let (frame_tx, frame_rx) = mpsc::channel(8);
    let (control_tx, control_rx) = mpsc::channel(8);
    let (_rfid_tx, rfid_rx) = mpsc::channel(8);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    control_tx.send(ControlMessage::Ignore).await.unwrap();
    frame_tx.send(frame_at(Local::now(), true, None, MatchDirection::In)).await.unwrap();
    drop(frame_tx);

    let outcome = ctl.run(frame_rx, control_rx, rfid_rx, shutdown_rx).await;
    assert_eq!(outcome, RunOutcome::Stopped);
    assert_eq!(ctl.state(), StateName::Ignoring);
}

#[tokio::test]
async fn test_run_returns_fail_safe_halt() {
    let (mut ctl, _door_rx) =
        controller(AdmissionSettings { max_consecutive: 1, ..guard_settings() }, no_rfid(), OutputDispatcher::new(OutputWriter::dry_run()));
    let (frame_tx, frame_rx) = mpsc::channel(8);
    let (_control_tx, control_rx) = mpsc::channel(8);
    let (_rfid_tx, rfid_rx) = mpsc::channel(8);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let t0 = Local::now();
    frame_tx.send(frame_at(t0, true, None, MatchDirection::In)).await.unwrap();
    for i in 1..=3 {
        let t = t0 + Duration::milliseconds(100 * i);
        frame_tx.send(frame_at(t, true, Some(0.2), MatchDirection::In)).await.unwrap();
    }

    let outcome = ctl.run(frame_rx, control_rx, rfid_rx, shutdown_rx).await;
    assert_eq!(outcome, RunOutcome::FailSafeHalt { count: 1 });
    assert_eq!(outcome.exit_code(), 2);
    assert_eq!(outcome.halt_error().unwrap().to_string(), "fail-safe halt after 1 consecutive lockouts");
    drop(frame_tx);
}

#[tokio::test]
async fn test_run_stops_on_message() {
    let (mut ctl, _door_rx) = controller(settings(), no_rfid(), OutputDispatcher::new(OutputWriter::dry_run()));
    let (_frame_tx, frame_rx) = mpsc::channel::<Frame>(8);
    let (control_tx, control_rx) = mpsc::channel(8);
    let (_rfid_tx, rfid_rx) = mpsc::channel(8);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    control_tx.send(ControlMessage::Stop).await.unwrap();
    let outcome = ctl.run(frame_rx, control_rx, rfid_rx, shutdown_rx).await;
    assert_eq!(outcome, RunOutcome::Stopped);
    assert_eq!(outcome.exit_code(), 0);
    assert!(outcome.halt_error().is_none());
}
