//! Build command execution.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Result of one shell command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub command: String,

    /// Exit code (0 = success, -1 = killed by signal).
    pub exit_code: i32,

    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandResult {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs build commands through `sh -c` with a per-command timeout.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
    env: BTreeMap<String, String>,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(900))
    }
}

impl CommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            env: BTreeMap::new(),
        }
    }

    /// Extra environment for every command.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Run `command` in `cwd`. A non-zero exit is a normal result, not an
    /// error; spawn failures and timeouts are errors.
    pub async fn run(&self, command: &str, cwd: &Path) -> Result<CommandResult> {
        let start = Instant::now();
        debug!(command = %command, cwd = %cwd.display(), "running command");

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .envs(&self.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PipelineError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| PipelineError::Timeout {
                command: command.to_string(),
                secs: self.timeout.as_secs(),
            })??;

        Ok(CommandResult {
            command: command.to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}
