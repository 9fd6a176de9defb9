//! Command runners for local and remote hosts

use async_trait::async_trait;
use std::process::{Output, Stdio};
use std::time::Duration;

use dl_core::config::ConnectionProfile;
use dl_core::error::CommandError;
use dl_core::traits::{CommandOptions, CommandOutput, RemoteCommandRunner};

use crate::ssh::{remote_exec_command, SshCommand};

/// Exit status `ssh` reserves for its own failures
const SSH_FAILURE_EXIT: i32 = 255;

async fn run_to_completion(
    mut command: tokio::process::Command,
    program: &str,
    timeout: Duration,
) -> Result<CommandOutput, CommandError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn().map_err(|source| CommandError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let output: Output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| CommandError::Timeout(timeout))??;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

/// Runs commands on a profile's host over `ssh`
#[derive(Debug, Clone)]
pub struct SshCommandRunner {
    profile: ConnectionProfile,
    default_timeout: Duration,
    server_alive_interval: Duration,
}

impl SshCommandRunner {
    pub fn new(
        profile: ConnectionProfile,
        default_timeout: Duration,
        server_alive_interval: Duration,
    ) -> Self {
        Self {
            profile,
            default_timeout,
            server_alive_interval,
        }
    }

    /// The command that would run `command` with `options`
    pub fn command_for(&self, command: &str, options: &CommandOptions) -> SshCommand {
        remote_exec_command(
            &self.profile,
            command,
            options.cwd.as_deref(),
            self.server_alive_interval,
        )
    }
}

#[async_trait]
impl RemoteCommandRunner for SshCommandRunner {
    async fn execute(
        &self,
        command: &str,
        options: &CommandOptions,
    ) -> Result<CommandOutput, CommandError> {
        let ssh = self.command_for(command, options);
        tracing::debug!("Running on {}: {}", self.profile.target(), command);

        let output = run_to_completion(
            ssh.to_command(),
            &ssh.program,
            options.timeout.unwrap_or(self.default_timeout),
        )
        .await?;

        if output.exit_code == SSH_FAILURE_EXIT {
            return Err(CommandError::Connection {
                target: self.profile.target(),
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    fn describe(&self) -> String {
        self.profile.target()
    }
}

/// Runs commands through the local shell
#[derive(Debug, Clone)]
pub struct LocalCommandRunner {
    default_timeout: Duration,
}

impl LocalCommandRunner {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }
}

#[async_trait]
impl RemoteCommandRunner for LocalCommandRunner {
    async fn execute(
        &self,
        command: &str,
        options: &CommandOptions,
    ) -> Result<CommandOutput, CommandError> {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(command);
        if let Some(dir) = &options.cwd {
            cmd.current_dir(dir);
        }
        tracing::debug!("Running locally: {}", command);

        run_to_completion(cmd, "sh", options.timeout.unwrap_or(self.default_timeout)).await
    }

    fn describe(&self) -> String {
        "local".to_string()
    }
}
