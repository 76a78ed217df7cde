//! Output writer - persists rendered templates and session images
//!
//! Every write creates missing parent directories first and replaces any
//! existing file at the target path.

use std::fs;
use std::path::Path;
use tracing::{debug, error};

#[derive(Debug, Clone, Default)]
pub struct OutputWriter {
    /// Render and log but skip touching the filesystem
    dry_run: bool,
}

impl OutputWriter {
    pub fn new() -> Self {
        Self { dry_run: false }
    }

    pub fn dry_run() -> Self {
        Self { dry_run: true }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Write `contents` to `path`
    /// Returns true if successful, false otherwise
    pub fn write(&self, path: &Path, contents: &[u8]) -> bool {
        if self.dry_run {
            debug!(path = %path.display(), bytes = contents.len(), "output_dry_run");
            return true;
        }

        match Self::write_file(path, contents) {
            Ok(()) => {
                debug!(path = %path.display(), bytes = contents.len(), "output_written");
                true
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "output_write_failed");
                false
            }
        }
    }

    fn write_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, contents)
    }
}
