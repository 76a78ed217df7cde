//! Catflap gate library
//!
//! An admission controller for an animal door: camera frame reports are
//! matched in sessions, the door is kept open or locked out, and named
//! events are rendered through `%var%` templates to files, MQTT and
//! external commands.
//!
//! Exposes modules for integration testing and binary reuse.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
