//! Error taxonomy shared by the controller and the template engine

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("unknown template setting \"{0}\"")]
    Settings(String),

    #[error("unresolved variable \"{name}\": {reason}")]
    UnresolvedVariable { name: String, reason: String },

    #[error("recursive variable chain: {0}")]
    Cycle(String),

    #[error("template i/o on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TemplateError {
    pub fn unresolved(name: &str, reason: impl Into<String>) -> Self {
        TemplateError::UnresolvedVariable { name: name.to_string(), reason: reason.into() }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("{what} capacity of {capacity} exceeded")]
    Capacity { what: &'static str, capacity: usize },

    #[error("hardware failure: {0}")]
    Hardware(String),

    #[error("fail-safe halt after {count} consecutive lockouts")]
    FailSafeHalt { count: u32 },
}
