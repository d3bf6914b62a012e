//! Process-spawning executor backed by `tokio::process`.

use super::{CommandOutput, Executor};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Runs real host commands with a per-call deadline
#[derive(Debug, Clone)]
pub struct SystemExecutor {
    timeout: Duration,
}

impl SystemExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Executor for SystemExecutor {
    async fn execute(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput> {
        // The timeout and cancel branches drop the wait future, which kills
        // the child.
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Spawn {
                program: program.to_string(),
                source,
            })?;

        debug!(program, ?args, "spawned command");

        tokio::select! {
            result = child.wait_with_output() => {
                let output = result?;
                Ok(CommandOutput {
                    code: output.status.code(),
                    stdout: output.stdout,
                    stderr: output.stderr,
                })
            }
            _ = tokio::time::sleep(self.timeout) => {
                warn!(program, ?args, timeout = ?self.timeout, "command timed out, killing it");
                Err(EngineError::Timeout {
                    program: program.to_string(),
                    after: self.timeout,
                })
            }
            _ = cancel.cancelled() => {
                debug!(program, "command cancelled");
                Err(EngineError::Cancelled {
                    program: program.to_string(),
                })
            }
        }
    }
}
