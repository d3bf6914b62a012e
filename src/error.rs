use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("command `{program}` exited with status {code:?}: {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("command `{program}` timed out after {after:?}")]
    Timeout { program: String, after: Duration },

    #[error("command `{program}` was cancelled")]
    Cancelled { program: String },

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// True for failures of the external toolchain that are expected to clear
    /// up on their own (non-zero exit, timeout, missing binary).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::CommandFailed { .. }
                | EngineError::Timeout { .. }
                | EngineError::Spawn { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
