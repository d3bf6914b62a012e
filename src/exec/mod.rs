//! External Command Execution
//!
//! Every interaction with the host toolchain (`zpool`, `zfs`, `smartctl`,
//! `lsblk`) goes through the [`Executor`] trait. Components hold an
//! `Arc<dyn Executor>` so tests can substitute [`FakeExecutor`].
//!
//! # Contract
//!
//! - Implementations provide one primitive, [`Executor::execute`], which
//!   returns the raw exit status plus captured stdout/stderr.
//! - [`Executor::run`], [`Executor::output`] and [`Executor::combined_output`]
//!   are built on top of it and turn a non-zero exit into
//!   [`EngineError::CommandFailed`] carrying the captured streams.
//! - Every call honours the caller's [`CancellationToken`] and the executor's
//!   own deadline. The child process is killed when either fires.

use crate::error::{EngineError, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub mod fake;
pub mod system;

pub use fake::{FakeExecutor, FakeResponse, RecordedCommand};
pub use system::SystemExecutor;

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was terminated by a signal
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }

    /// Converts a non-zero exit into [`EngineError::CommandFailed`].
    pub fn into_result(self, program: &str) -> Result<CommandOutput> {
        if self.success() {
            Ok(self)
        } else {
            Err(EngineError::CommandFailed {
                program: program.to_string(),
                code: self.code,
                stdout: self.stdout_lossy(),
                stderr: self.stderr_lossy(),
            })
        }
    }
}

#[async_trait]
pub trait Executor: Send + Sync {
    /// Runs `program` to completion and reports its exit status without
    /// interpreting it.
    async fn execute(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput>;

    /// Runs a command, failing on non-zero exit.
    async fn run(&self, cancel: &CancellationToken, program: &str, args: &[&str]) -> Result<()> {
        self.execute(cancel, program, args)
            .await?
            .into_result(program)
            .map(|_| ())
    }

    /// Runs a command and returns its standard output.
    async fn output(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[&str],
    ) -> Result<Vec<u8>> {
        let output = self.execute(cancel, program, args).await?.into_result(program)?;
        Ok(output.stdout)
    }

    /// Runs a command and returns stdout followed by stderr.
    async fn combined_output(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[&str],
    ) -> Result<Vec<u8>> {
        let output = self.execute(cancel, program, args).await?.into_result(program)?;
        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);
        Ok(combined)
    }
}
