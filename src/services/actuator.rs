//! Door lock actuation via HTTP requests or shell commands

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::{error, info};

use crate::domain::error::AdmissionError;
use crate::infra::config::{ActuatorMode, Config};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorCommand {
    Lock,
    Unlock,
}

impl DoorCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            DoorCommand::Lock => "lock",
            DoorCommand::Unlock => "unlock",
        }
    }
}

impl std::fmt::Display for DoorCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("door endpoint answered {0}")]
    Status(u16),
    #[error("command failed: {0}")]
    Command(String),
}

impl From<ActuatorError> for AdmissionError {
    fn from(e: ActuatorError) -> Self {
        AdmissionError::Hardware(e.to_string())
    }
}

/// Drives the physical lock. Commands must be idempotent.
#[async_trait]
pub trait DoorActuator: Send + Sync {
    fn mode(&self) -> &'static str;
    async fn apply(&self, command: DoorCommand) -> Result<(), ActuatorError>;
}

/// Logs commands without touching hardware
#[derive(Debug, Default)]
pub struct LogActuator;

#[async_trait]
impl DoorActuator for LogActuator {
    fn mode(&self) -> &'static str {
        "log"
    }

    async fn apply(&self, command: DoorCommand) -> Result<(), ActuatorError> {
        info!(command = %command, mode = "log", "door_command");
        Ok(())
    }
}

/// Parse URL and extract basic auth credentials if present
fn parse_url_with_auth(url: &str) -> (String, Option<String>, Option<String>) {
    for scheme in ["http://", "https://"] {
        let Some(rest) = url.strip_prefix(scheme) else {
            continue;
        };
        if let Some((auth, host)) = rest.split_once('@') {
            if let Some((username, password)) = auth.split_once(':') {
                return (format!("{scheme}{host}"), Some(username.to_string()), Some(password.to_string()));
            }
        }
    }
    (url.to_string(), None, None)
}

struct Endpoint {
    url: String,
    auth: Option<String>,
}

impl Endpoint {
    fn new(raw: &str) -> Self {
        let (url, username, password) = parse_url_with_auth(raw);
        let auth = match (username, password) {
            (Some(u), Some(p)) => Some(format!("Basic {}", STANDARD.encode(format!("{u}:{p}").as_bytes()))),
            _ => None,
        };
        Self { url, auth }
    }
}

/// Lock controller reachable over HTTP, one URL per command
pub struct HttpActuator {
    client: reqwest::Client,
    lock: Endpoint,
    unlock: Endpoint,
}

impl HttpActuator {
    pub fn new(lock_url: &str, unlock_url: &str, timeout: Duration) -> Result<Self, ActuatorError> {
        // Create HTTP client once for reuse (connection pooling)
        let client = reqwest::Client::builder().timeout(timeout).http1_only().build()?;
        Ok(Self { client, lock: Endpoint::new(lock_url), unlock: Endpoint::new(unlock_url) })
    }
}

#[async_trait]
impl DoorActuator for HttpActuator {
    fn mode(&self) -> &'static str {
        "http"
    }

    async fn apply(&self, command: DoorCommand) -> Result<(), ActuatorError> {
        let endpoint = match command {
            DoorCommand::Lock => &self.lock,
            DoorCommand::Unlock => &self.unlock,
        };

        let mut request = self.client.get(&endpoint.url).header("Accept", "*/*");
        if let Some(auth) = &endpoint.auth {
            request = request.header("Authorization", auth);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ActuatorError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Runs a shell command per lock/unlock, e.g. a GPIO helper
pub struct CommandActuator {
    lock_command: String,
    unlock_command: String,
    timeout: Duration,
}

impl CommandActuator {
    pub fn new(lock_command: &str, unlock_command: &str, timeout: Duration) -> Self {
        Self {
            lock_command: lock_command.to_string(),
            unlock_command: unlock_command.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl DoorActuator for CommandActuator {
    fn mode(&self) -> &'static str {
        "command"
    }

    async fn apply(&self, command: DoorCommand) -> Result<(), ActuatorError> {
        let cmdline = match command {
            DoorCommand::Lock => &self.lock_command,
            DoorCommand::Unlock => &self.unlock_command,
        };

        let child = Command::new("sh").arg("-c").arg(cmdline).kill_on_drop(true).status();
        match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(ActuatorError::Command(format!("{cmdline}: {status}"))),
            Ok(Err(e)) => Err(ActuatorError::Command(format!("{cmdline}: {e}"))),
            Err(_) => Err(ActuatorError::Command(format!("{cmdline}: timed out"))),
        }
    }
}

/// Build the actuator selected by `[actuator] mode`
pub fn build_actuator(config: &Config) -> Result<Arc<dyn DoorActuator>, ActuatorError> {
    let timeout = Duration::from_millis(config.actuator_timeout_ms());
    let actuator: Arc<dyn DoorActuator> = match config.actuator_mode() {
        ActuatorMode::Log => Arc::new(LogActuator),
        ActuatorMode::Http => {
            Arc::new(HttpActuator::new(config.actuator_lock_url(), config.actuator_unlock_url(), timeout)?)
        }
        ActuatorMode::Command => Arc::new(CommandActuator::new(
            config.actuator_lock_command(),
            config.actuator_unlock_command(),
            timeout,
        )),
    };
    Ok(actuator)
}

/// Apply a command and log the outcome. Returns latency in microseconds.
pub async fn send_door_command(actuator: &dyn DoorActuator, command: DoorCommand) -> (bool, u64) {
    let start = Instant::now();
    let result = actuator.apply(command).await;
    let latency_us = start.elapsed().as_micros() as u64;

    match result {
        Ok(()) => {
            info!(command = %command, latency_us = %latency_us, mode = actuator.mode(), "door_command");
            (true, latency_us)
        }
        Err(e) => {
            error!(
                command = %command,
                latency_us = %latency_us,
                error = %e,
                mode = actuator.mode(),
                "door_command_error"
            );
            (false, latency_us)
        }
    }
}
