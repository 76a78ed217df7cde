//! Door command worker - processes lock/unlock commands off the hot path
//!
//! This worker decouples actuation from the control loop so network or
//! process I/O never stalls frame processing. The controller enqueues
//! commands through a [`DoorHandle`] and the worker applies them in order.

use crate::infra::metrics::Metrics;
use crate::services::actuator::{send_door_command, DoorActuator, DoorCommand};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// A door command to be processed by the worker
#[derive(Debug)]
pub struct DoorCmd {
    pub command: DoorCommand,
    /// When the command was enqueued (for queue delay measurement)
    pub enqueued_at: Instant,
}

/// Non-blocking handle the controller uses to drive the lock
#[derive(Debug, Clone)]
pub struct DoorHandle {
    tx: mpsc::Sender<DoorCmd>,
}

impl DoorHandle {
    pub fn new(tx: mpsc::Sender<DoorCmd>) -> Self {
        Self { tx }
    }

    pub fn lock(&self) -> bool {
        self.send(DoorCommand::Lock)
    }

    pub fn unlock(&self) -> bool {
        self.send(DoorCommand::Unlock)
    }

    fn send(&self, command: DoorCommand) -> bool {
        match self.tx.try_send(DoorCmd { command, enqueued_at: Instant::now() }) {
            Ok(()) => true,
            Err(e) => {
                warn!(command = %command, error = %e, "door_command_dropped");
                false
            }
        }
    }
}

/// Worker that applies door commands asynchronously
pub struct DoorCmdWorker {
    actuator: Arc<dyn DoorActuator>,
    cmd_rx: mpsc::Receiver<DoorCmd>,
    metrics: Arc<Metrics>,
}

impl DoorCmdWorker {
    pub fn new(actuator: Arc<dyn DoorActuator>, cmd_rx: mpsc::Receiver<DoorCmd>, metrics: Arc<Metrics>) -> Self {
        Self { actuator, cmd_rx, metrics }
    }

    /// Run the worker, processing commands until the channel closes
    pub async fn run(mut self) {
        info!(mode = self.actuator.mode(), "door_cmd_worker_started");

        while let Some(cmd) = self.cmd_rx.recv().await {
            let queue_delay_us = cmd.enqueued_at.elapsed().as_micros() as u64;

            let (ok, send_latency_us) = send_door_command(self.actuator.as_ref(), cmd.command).await;

            info!(
                command = %cmd.command,
                queue_delay_us = %queue_delay_us,
                send_latency_us = %send_latency_us,
                ok = ok,
                "door_cmd_processed"
            );

            self.metrics.record_actuator_command(ok);
            self.metrics.record_actuator_queue_delay(queue_delay_us);

            // Warn if queue delay exceeds 1ms - indicates backlog
            if queue_delay_us > 1000 {
                warn!(command = %cmd.command, queue_delay_us = %queue_delay_us, "door_cmd_queue_delay_high");
            }
        }

        info!("door_cmd_worker_stopped");
    }
}

/// Create a door command channel and worker
///
/// Returns the handle (for the controller) and the worker (to be spawned)
pub fn create_door_worker(
    actuator: Arc<dyn DoorActuator>,
    metrics: Arc<Metrics>,
    buffer_size: usize,
) -> (DoorHandle, DoorCmdWorker) {
    let (cmd_tx, cmd_rx) = mpsc::channel(buffer_size);
    let worker = DoorCmdWorker::new(actuator, cmd_rx, metrics);
    (DoorHandle::new(cmd_tx), worker)
}
