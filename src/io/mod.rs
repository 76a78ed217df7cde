//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `vision` - MQTT client for frame reports from the vision process
//! - `rfid` - Serial RFID tag readers
//! - `publish_channel` - Typed channel for rendered template publishes
//! - `publisher` - MQTT publisher draining the publish channel
//! - `output_writer` - Filesystem sink for rendered templates and images
//! - `command` - Background runner for event commands
//! - `prometheus` - Metrics, status and control HTTP endpoint

pub mod command;
pub mod output_writer;
pub mod prometheus;
pub mod publish_channel;
pub mod publisher;
pub mod rfid;
pub mod vision;

// Re-export commonly used types
pub use command::CommandRunner;
pub use output_writer::OutputWriter;
pub use publish_channel::{create_publish_channel, PublishMessage, PublishSender};
pub use publisher::MqttPublisher;
pub use rfid::RfidListener;
pub use vision::start_vision_client;
