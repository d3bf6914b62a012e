//! Scripted executor for tests and dry runs.
//!
//! Responses are registered per program and argument prefix. The most
//! recently registered matching rule wins, so a test can change what a tool
//! reports between two scans simply by registering a new response.

use super::{CommandOutput, Executor};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Canned reaction to a matching command
#[derive(Debug, Clone)]
pub enum FakeResponse {
    Output(CommandOutput),
    Timeout,
}

impl FakeResponse {
    /// Successful exit with the given stdout.
    pub fn stdout(stdout: impl Into<String>) -> Self {
        FakeResponse::Output(CommandOutput {
            code: Some(0),
            stdout: stdout.into().into_bytes(),
            stderr: Vec::new(),
        })
    }

    pub fn exit(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        FakeResponse::Output(CommandOutput {
            code: Some(code),
            stdout: stdout.into().into_bytes(),
            stderr: stderr.into().into_bytes(),
        })
    }

    pub fn timeout() -> Self {
        FakeResponse::Timeout
    }
}

/// A command observed by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl RecordedCommand {
    /// `program arg1 arg2 ...`, handy for assertions.
    pub fn line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone)]
struct Rule {
    program: String,
    args_prefix: Vec<String>,
    response: FakeResponse,
    delay: Option<Duration>,
}

impl Rule {
    fn matches(&self, program: &str, args: &[&str]) -> bool {
        self.program == program
            && self.args_prefix.len() <= args.len()
            && self
                .args_prefix
                .iter()
                .zip(args.iter())
                .all(|(expected, actual)| expected == actual)
    }
}

#[derive(Debug, Default)]
pub struct FakeExecutor {
    rules: Mutex<Vec<Rule>>,
    commands: Mutex<Vec<RecordedCommand>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `response` for `program` invoked with arguments starting
    /// with `args_prefix`.
    pub fn respond(&self, program: &str, args_prefix: &[&str], response: FakeResponse) {
        self.push_rule(program, args_prefix, response, None);
    }

    /// Like [`respond`](Self::respond) but the command takes `delay` to finish.
    pub fn respond_after(
        &self,
        program: &str,
        args_prefix: &[&str],
        delay: Duration,
        response: FakeResponse,
    ) {
        self.push_rule(program, args_prefix, response, Some(delay));
    }

    fn push_rule(
        &self,
        program: &str,
        args_prefix: &[&str],
        response: FakeResponse,
        delay: Option<Duration>,
    ) {
        let rule = Rule {
            program: program.to_string(),
            args_prefix: args_prefix.iter().map(|a| a.to_string()).collect(),
            response,
            delay,
        };
        self.rules
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(rule);
    }

    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.commands
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Recorded commands whose rendered line starts with `prefix`.
    pub fn count_matching(&self, prefix: &str) -> usize {
        self.commands()
            .iter()
            .filter(|c| c.line().starts_with(prefix))
            .count()
    }

    pub fn clear_commands(&self) {
        self.commands
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

#[async_trait]
impl Executor for FakeExecutor {
    async fn execute(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput> {
        self.commands
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(RecordedCommand {
                program: program.to_string(),
                args: args.iter().map(|a| a.to_string()).collect(),
            });

        let rule = self
            .rules
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .rev()
            .find(|rule| rule.matches(program, args))
            .cloned();

        let Some(rule) = rule else {
            return Ok(CommandOutput {
                code: Some(127),
                stdout: Vec::new(),
                stderr: format!("no fake response for {program}").into_bytes(),
            });
        };

        if let Some(delay) = rule.delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    return Err(EngineError::Cancelled { program: program.to_string() });
                }
            }
        }

        match rule.response {
            FakeResponse::Output(output) => Ok(output),
            FakeResponse::Timeout => Err(EngineError::Timeout {
                program: program.to_string(),
                after: rule.delay.unwrap_or_default(),
            }),
        }
    }
}
