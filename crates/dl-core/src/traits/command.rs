//! Remote command execution traits

use async_trait::async_trait;
use std::time::Duration;

use crate::error::CommandError;

/// Options for a single command
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    /// Working directory on the target host
    pub cwd: Option<String>,
    /// Deadline for the command; the runner's default applies when unset
    pub timeout: Option<Duration>,
}

impl CommandOptions {
    /// Options running in `cwd`
    pub fn in_dir(cwd: impl Into<String>) -> Self {
        Self {
            cwd: Some(cwd.into()),
            timeout: None,
        }
    }

    /// Set the command deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    /// Whether the command exited with status 0
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs shell commands on the host a profile points at
///
/// A non-zero exit status is reported in [`CommandOutput`], not as an error;
/// errors are reserved for failing to run the command at all.
#[async_trait]
pub trait RemoteCommandRunner: Send + Sync {
    /// Run `command` through the target's shell
    async fn execute(
        &self,
        command: &str,
        options: &CommandOptions,
    ) -> Result<CommandOutput, CommandError>;

    /// Human-readable description of the target, for logs
    fn describe(&self) -> String;
}
