use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tracing::info;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Failed to execute {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {seconds}s")]
    Timeout { program: &'static str, seconds: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Program {
    Git,
    Gh,
}

impl Program {
    pub fn binary(self) -> &'static str {
        match self {
            Program::Git => "git",
            Program::Gh => "gh",
        }
    }
}

/// A fully validated command, ready to run
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub program: Program,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Complete child environment; nothing is inherited
    pub env: HashMap<String, String>,
    pub stdin: Option<String>,
}

impl CommandRequest {
    pub fn git<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Program::Git, args)
    }

    pub fn gh<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Program::Gh, args)
    }

    fn new<I, S>(program: Program, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program,
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            env: HashMap::new(),
            stdin: None,
        }
    }

    pub fn current_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn envs(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

/// Result of executing a command
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub success: bool,
}

/// The only component allowed to run `git` or `gh`
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// A non-zero exit is a normal `CommandOutput`, not an error
    async fn execute(&self, request: CommandRequest) -> Result<CommandOutput, ExecutorError>;
}

/// Runs commands as child processes
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    timeout: Duration,
}

impl ProcessExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, request: CommandRequest) -> Result<CommandOutput, ExecutorError> {
        let program = request.program.binary();

        let mut command = Command::new(program);
        command
            .args(&request.args)
            .env_clear()
            .envs(&request.env)
            .stdin(if request.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &request.cwd {
            command.current_dir(cwd);
        }

        let mut child = command
            .spawn()
            .map_err(|source| ExecutorError::Spawn { program, source })?;

        let stdin = child.stdin.take();
        let run = write_then_wait(stdin, request.stdin.as_deref(), child.wait_with_output());
        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| ExecutorError::Timeout {
                program,
                seconds: self.timeout.as_secs(),
            })??;

        let exit_code = output.status.code().unwrap_or(-1);
        info!(program, args = ?request.args, exit_code, "command finished");

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code,
            success: output.status.success(),
        })
    }
}

/// Feed `input` to the child, close its stdin, then wait for it.
///
/// The caller bounds the whole future, so a child that never drains its
/// stdin cannot stall the write past the timeout.
async fn write_then_wait<W, F, T>(stdin: Option<W>, input: Option<&str>, wait: F) -> std::io::Result<T>
where
    W: AsyncWrite + Unpin,
    F: Future<Output = std::io::Result<T>>,
{
    if let (Some(mut stdin), Some(input)) = (stdin, input) {
        stdin.write_all(input.as_bytes()).await?;
    }
    wait.await
}
