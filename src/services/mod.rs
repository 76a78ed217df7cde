//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `admission` - The door's state machine and control loop
//! - `lockout_policy` - Lockout exit rules per method
//! - `consecutive_guard` - Fail-safe on repeated lockouts
//! - `rfid_check` - RFID tag cross-check
//! - `matcher` - Match and obstruction detection seams
//! - `template` - The `%var%` output template language
//! - `output` - Renders templates for events and dispatches the results
//! - `actuator` - Door lock interface
//! - `actuator_worker` - Async door command worker

pub mod actuator;
pub mod actuator_worker;
pub mod admission;
pub mod consecutive_guard;
pub mod lockout_policy;
pub mod matcher;
pub mod output;
pub mod rfid_check;
pub mod template;

// Re-export commonly used types
pub use actuator::{build_actuator, DoorActuator, DoorCommand};
pub use actuator_worker::{create_door_worker, DoorCmd, DoorCmdWorker, DoorHandle};
pub use admission::{AdmissionController, AdmissionSettings, Collaborators, RunOutcome};
pub use output::OutputDispatcher;
