//! Session bookkeeping for one obstruction-to-decision episode.

use bytes::Bytes;
use chrono::{DateTime, Local, SecondsFormat};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::domain::error::AdmissionError;
use crate::domain::types::{MatchDirection, MatchResult};

/// Fixed number of match attempts in one session
pub const MATCH_MAX_COUNT: usize = 4;

/// Bytes kept from the digest, giving 40 hex characters
const ID_BYTES: usize = 20;

/// Content-derived identifier of a match or a whole session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContentId([u8; ID_BYTES]);

impl ContentId {
    pub const HEX_LEN: usize = ID_BYTES * 2;

    fn from_hasher(hasher: Sha256) -> Self {
        let digest = hasher.finalize();
        let mut id = [0u8; ID_BYTES];
        id.copy_from_slice(&digest[..ID_BYTES]);
        Self(id)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First `len` hex characters, clamped to the full id length
    pub fn truncated(&self, len: usize) -> String {
        let mut s = self.to_hex();
        s.truncate(len.min(Self::HEX_LEN));
        s
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

fn time_key(time: &DateTime<Local>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Image of the frame that opened the session
#[derive(Debug, Clone, Default)]
pub struct ObstructFrame {
    pub time: Option<DateTime<Local>>,
    pub image: Bytes,
    pub path: String,
    pub filename: String,
    pub full_path: String,
}

/// One match attempt within a session
#[derive(Debug, Clone)]
pub struct MatchState {
    pub time: DateTime<Local>,
    pub image: Bytes,
    pub result: MatchResult,
    pub id: ContentId,
    pub path: String,
    pub filename: String,
    pub full_path: String,
}

impl MatchState {
    pub fn new(time: DateTime<Local>, image: Bytes, result: MatchResult) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(&image);
        hasher.update(time_key(&time).as_bytes());
        Self {
            time,
            image,
            result,
            id: ContentId::from_hasher(hasher),
            path: String::new(),
            filename: String::new(),
            full_path: String::new(),
        }
    }
}

/// An ordered, bounded series of match attempts plus derived verdict
#[derive(Debug, Clone, Default)]
pub struct MatchGroup {
    matches: Vec<MatchState>,
    pub obstruct: ObstructFrame,
    pub start_time: Option<DateTime<Local>>,
    pub end_time: Option<DateTime<Local>>,
    pub success_count: usize,
    /// Verdict from the image matches alone
    pub final_decision: bool,
    /// Overall outcome, true when the animal is let through
    pub success: bool,
    pub direction: MatchDirection,
    pub description: String,
    pub id: ContentId,
    finalized: bool,
}

impl MatchGroup {
    pub fn matches(&self) -> &[MatchState] {
        &self.matches
    }

    pub fn matches_mut(&mut self) -> &mut [MatchState] {
        &mut self.matches
    }

    pub fn count(&self) -> usize {
        self.matches.len()
    }

    pub fn is_full(&self) -> bool {
        self.matches.len() >= MATCH_MAX_COUNT
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn last(&self) -> Option<&MatchState> {
        self.matches.last()
    }

    /// Session id: SHA-256 over the obstruction image and start time,
    /// then each match's image, time and score in session order.
    fn compute_id(&self) -> ContentId {
        let mut hasher = Sha256::new();
        hasher.update(&self.obstruct.image);
        if let Some(start) = &self.start_time {
            hasher.update(time_key(start).as_bytes());
        }
        for m in &self.matches {
            hasher.update(&m.image);
            hasher.update(time_key(&m.time).as_bytes());
            hasher.update(format!("{:.6}", m.result.score).as_bytes());
        }
        ContentId::from_hasher(hasher)
    }

    /// Aggregate direction: `In` needs to beat both other kinds, `Out` only
    /// has to beat the unknowns
    fn majority_direction(&self) -> MatchDirection {
        let (ins, outs, unknowns) = self.direction_counts();
        Self::aggregate(ins, outs, unknowns)
    }

    fn direction_counts(&self) -> (usize, usize, usize) {
        let (mut ins, mut outs, mut unknowns) = (0usize, 0usize, 0usize);
        for m in &self.matches {
            match m.result.direction {
                MatchDirection::In => ins += 1,
                MatchDirection::Out => outs += 1,
                MatchDirection::Unknown => unknowns += 1,
            }
        }
        (ins, outs, unknowns)
    }

    fn aggregate(ins: usize, outs: usize, unknowns: usize) -> MatchDirection {
        if ins > outs && ins > unknowns {
            MatchDirection::In
        } else if outs > unknowns {
            MatchDirection::Out
        } else {
            MatchDirection::Unknown
        }
    }

    /// True when the remaining attempts can no longer change a lockout verdict
    pub fn failure_is_certain(&self, ok_matches_needed: usize) -> bool {
        let remaining = MATCH_MAX_COUNT - self.matches.len().min(MATCH_MAX_COUNT);
        if self.success_count + remaining >= ok_matches_needed {
            return false;
        }
        // Best case for "going out" is every remaining vote being outbound
        let (ins, outs, unknowns) = self.direction_counts();
        Self::aggregate(ins, outs + remaining, unknowns) != MatchDirection::Out
    }
}

/// Owns the current session and applies start/record/finalize transitions
#[derive(Debug, Default)]
pub struct MatchGroupTracker {
    group: MatchGroup,
}

impl MatchGroupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(&self) -> &MatchGroup {
        &self.group
    }

    pub fn group_mut(&mut self) -> &mut MatchGroup {
        &mut self.group
    }

    /// Replace any previous session with a new one opened by an obstruction
    pub fn start_session(
        &mut self,
        obstruct_path: &str,
        image: Bytes,
        time: DateTime<Local>,
    ) -> &MatchGroup {
        self.group = MatchGroup {
            obstruct: ObstructFrame {
                time: Some(time),
                image,
                path: obstruct_path.to_string(),
                ..Default::default()
            },
            start_time: Some(time),
            ..Default::default()
        };
        self.group.id = self.group.compute_id();
        &self.group
    }

    pub fn record(&mut self, state: MatchState) -> Result<&MatchState, AdmissionError> {
        if self.group.is_full() || self.group.finalized {
            return Err(AdmissionError::Capacity {
                what: "match group",
                capacity: MATCH_MAX_COUNT,
            });
        }
        if state.result.success {
            self.group.success_count += 1;
        }
        self.group.matches.push(state);
        self.group.direction = self.group.majority_direction();
        self.group.id = self.group.compute_id();
        Ok(&self.group.matches[self.group.matches.len() - 1])
    }

    /// Seal the session and derive its verdict. Outbound sessions always pass.
    pub fn finalize(&mut self, ok_matches_needed: usize, now: DateTime<Local>) -> &MatchGroup {
        let group = &mut self.group;
        group.final_decision = group.success_count >= ok_matches_needed;
        group.direction = group.majority_direction();
        group.end_time = Some(now);
        group.id = group.compute_id();

        if group.direction == MatchDirection::Out {
            group.success = true;
            group.description = String::from("Going out");
        } else if group.final_decision {
            group.success = true;
            group.description = String::from("Everything OK!");
        } else {
            group.success = false;
            group.description = format!(
                "Lockout {} of {} matches failed",
                group.count() - group.success_count,
                group.count()
            );
        }
        group.finalized = true;
        &self.group
    }
}
