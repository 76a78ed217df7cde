use bytes::Bytes;
use chrono::{DateTime, Local};
use serde::Deserialize;
use smallvec::SmallVec;
use std::fmt;

use crate::domain::error::AdmissionError;

/// Maximum number of diagnostic step images a single match may carry
pub const MAX_STEPS: usize = 24;

/// Direction an animal was moving through the door
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchDirection {
    In,
    Out,
    #[default]
    Unknown,
}

impl MatchDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchDirection::In => "in",
            MatchDirection::Out => "out",
            MatchDirection::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MatchDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MatchDirection {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "in" => MatchDirection::In,
            "out" => MatchDirection::Out,
            _ => MatchDirection::Unknown,
        })
    }
}

/// Controller state names as exposed to logs and templates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateName {
    /// Only ever seen as the previous state before the first transition
    Initial,
    Waiting,
    Matching,
    KeepOpen,
    LockedOut,
    Ignoring,
}

impl StateName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateName::Initial => "Initial",
            StateName::Waiting => "Waiting",
            StateName::Matching => "Matching",
            StateName::KeepOpen => "Keep open",
            StateName::LockedOut => "Lockout",
            StateName::Ignoring => "Ignoring",
        }
    }
}

impl fmt::Display for StateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy used to end a lockout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockoutMethod {
    /// Unlock once the lockout time has passed, ignoring obstruction
    #[default]
    TimerOnly,
    /// Start the lockout timer only after the frame clears
    ObstructThenTimer,
    /// Unlock when the frame clears or the lockout time has passed
    ObstructOrTimer,
}

impl LockoutMethod {
    /// Numeric identifier used by the `lockout_method` template variable
    pub fn as_number(&self) -> u8 {
        match self {
            LockoutMethod::TimerOnly => 1,
            LockoutMethod::ObstructThenTimer => 2,
            LockoutMethod::ObstructOrTimer => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LockoutMethod::TimerOnly => "timer_only",
            LockoutMethod::ObstructThenTimer => "obstruct_then_timer",
            LockoutMethod::ObstructOrTimer => "obstruct_or_timer",
        }
    }
}

/// Named occurrences that trigger output templates and external commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdmissionEvent {
    FrameObstructed,
    Match,
    MatchDone,
    MatchGroupDone,
    SaveImg,
    LockedOut,
    Unlocked,
    StateChange,
    RfidDetect,
    RfidMatch,
    FailSafeHalt,
}

impl AdmissionEvent {
    pub const ALL: [AdmissionEvent; 11] = [
        AdmissionEvent::FrameObstructed,
        AdmissionEvent::Match,
        AdmissionEvent::MatchDone,
        AdmissionEvent::MatchGroupDone,
        AdmissionEvent::SaveImg,
        AdmissionEvent::LockedOut,
        AdmissionEvent::Unlocked,
        AdmissionEvent::StateChange,
        AdmissionEvent::RfidDetect,
        AdmissionEvent::RfidMatch,
        AdmissionEvent::FailSafeHalt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionEvent::FrameObstructed => "frame_obstructed",
            AdmissionEvent::Match => "match",
            AdmissionEvent::MatchDone => "match_done",
            AdmissionEvent::MatchGroupDone => "match_group_done",
            AdmissionEvent::SaveImg => "save_img",
            AdmissionEvent::LockedOut => "locked_out",
            AdmissionEvent::Unlocked => "unlocked",
            AdmissionEvent::StateChange => "state_change",
            AdmissionEvent::RfidDetect => "rfid_detect",
            AdmissionEvent::RfidMatch => "rfid_match",
            AdmissionEvent::FailSafeHalt => "fail_safe_halt",
        }
    }
}

impl fmt::Display for AdmissionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One diagnostic stage image produced by the matcher
#[derive(Debug, Clone, Default)]
pub struct MatchStep {
    pub name: String,
    pub description: String,
    pub image: Option<Bytes>,
    /// Directory the step image is saved to (empty until paths are assigned)
    pub path: String,
    pub filename: String,
    pub full_path: String,
}

impl MatchStep {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self { name: name.into(), description: description.into(), ..Default::default() }
    }

    pub fn with_image(mut self, image: Bytes) -> Self {
        self.image = Some(image);
        self
    }
}

/// Outcome of a single match attempt, produced by the matcher collaborator
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    /// Similarity score in 0.0..=1.0
    pub score: f64,
    pub success: bool,
    pub description: String,
    pub direction: MatchDirection,
    steps: SmallVec<[MatchStep; 4]>,
}

impl MatchResult {
    pub fn new(score: f64, success: bool, direction: MatchDirection) -> Self {
        Self { score, success, direction, ..Default::default() }
    }

    /// A failed attempt, used when the matcher itself errors
    pub fn failed(description: impl Into<String>) -> Self {
        Self { description: description.into(), ..Default::default() }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn push_step(&mut self, step: MatchStep) -> Result<(), AdmissionError> {
        if self.steps.len() >= MAX_STEPS {
            return Err(AdmissionError::Capacity { what: "match steps", capacity: MAX_STEPS });
        }
        self.steps.push(step);
        Ok(())
    }

    pub fn steps(&self) -> &[MatchStep] {
        &self.steps
    }

    pub fn steps_mut(&mut self) -> &mut [MatchStep] {
        &mut self.steps
    }
}

/// Analysis attached to a frame by the external vision process
#[derive(Debug, Clone, Default)]
pub struct FrameReport {
    pub obstructed: bool,
    pub score: Option<f64>,
    pub direction: MatchDirection,
    pub description: String,
    pub steps: Vec<MatchStep>,
}

/// A captured camera frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub captured_at: DateTime<Local>,
    /// Encoded image bytes, opaque to the controller
    pub image: Bytes,
    pub report: Option<FrameReport>,
}

impl Frame {
    pub fn new(captured_at: DateTime<Local>, image: Bytes) -> Self {
        Self { captured_at, image, report: None }
    }

    pub fn with_report(mut self, report: FrameReport) -> Self {
        self.report = Some(report);
        self
    }
}

/// Which of the two RFID antennas produced a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RfidReader {
    Inner,
    Outer,
}

impl RfidReader {
    pub fn as_str(&self) -> &'static str {
        match self {
            RfidReader::Inner => "Inner",
            RfidReader::Outer => "Outer",
        }
    }

    /// Direction implied when this reader triggers after the other one
    pub fn direction(&self) -> MatchDirection {
        match self {
            RfidReader::Inner => MatchDirection::In,
            RfidReader::Outer => MatchDirection::Out,
        }
    }
}

impl fmt::Display for RfidReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tag read reported by one of the RFID readers
#[derive(Debug, Clone, PartialEq)]
pub struct RfidRead {
    pub reader: RfidReader,
    pub tag: String,
    /// False when the reader delivered a partial tag
    pub complete: bool,
}

/// Out-of-band requests consumed by the control loop between frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMessage {
    Stop,
    ForceUnlock,
    ForceLockout,
    Ignore,
    Attention,
}

impl ControlMessage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlMessage::Stop => "stop",
            ControlMessage::ForceUnlock => "force_unlock",
            ControlMessage::ForceLockout => "force_lockout",
            ControlMessage::Ignore => "ignore",
            ControlMessage::Attention => "attention",
        }
    }
}

impl fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ControlMessage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stop" => Ok(ControlMessage::Stop),
            "force_unlock" | "unlock" => Ok(ControlMessage::ForceUnlock),
            "force_lockout" | "lockout" => Ok(ControlMessage::ForceLockout),
            "ignore" => Ok(ControlMessage::Ignore),
            "attention" => Ok(ControlMessage::Attention),
            other => Err(format!("unknown control message \"{other}\"")),
        }
    }
}
