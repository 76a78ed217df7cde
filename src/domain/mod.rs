//! Domain models - core admission types and session bookkeeping
//!
//! This module contains the canonical data types used throughout the system:
//! - `MatchResult` / `MatchStep` - outcome of one match attempt
//! - `MatchGroup` - one obstruction-to-decision session
//! - `AdmissionEvent` - named occurrences that drive outputs
//! - `Timer` - elapsed-time checks against frame timestamps

pub mod error;
pub mod match_group;
pub mod timer;
pub mod types;
