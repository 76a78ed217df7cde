//! External command runner
//!
//! Event commands are rendered by the output dispatcher and spawned here
//! through `sh -c` on the tokio runtime, so the control loop never waits on
//! a child process.

use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    shell: String,
}

impl CommandRunner {
    pub fn new() -> Self {
        Self { shell: String::from("sh") }
    }

    /// Spawn `cmdline` in the background. Returns false if nothing was started.
    pub fn spawn(&self, event: &str, cmdline: String) -> bool {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(event = %event, "command_no_runtime");
            return false;
        };

        let shell = self.shell.clone();
        let event = event.to_string();
        info!(event = %event, cmd = %cmdline, "command_spawn");

        handle.spawn(async move {
            let started = Instant::now();
            match Command::new(&shell).arg("-c").arg(&cmdline).kill_on_drop(false).status().await {
                Ok(status) if status.success() => {
                    debug!(
                        event = %event,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "command_done"
                    );
                }
                Ok(status) => {
                    warn!(event = %event, cmd = %cmdline, status = %status, "command_failed");
                }
                Err(e) => {
                    warn!(event = %event, cmd = %cmdline, error = %e, "command_spawn_failed");
                }
            }
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_spawn_without_runtime() {
        let runner = CommandRunner::new();
        assert!(!runner.spawn("match_done", "true".to_string()));
    }

    #[tokio::test]
    async fn test_spawn_runs_command() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("ran");
        let runner = CommandRunner::new();
        assert!(runner.spawn("match_done", format!("touch {}", marker.display())));

        for _ in 0..50 {
            if marker.exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(marker.exists());
    }
}
