//! Secure shell invocations
//!
//! Builds the `ssh` argument vectors for the forwarding tunnel and for remote
//! commands. Secrets never appear in arguments: password and passphrase
//! authentication go through `sshpass -e`, which reads `SSHPASS` from the
//! child's environment.
//!
//! Host keys are not verified (`StrictHostKeyChecking=no` with a throwaway
//! known-hosts file). Targets are named explicitly by the user's profiles and
//! the tunnel is used non-interactively, where a first-contact prompt would
//! hang the caller; an on-path attacker can therefore impersonate the host.

use std::fmt;
use std::time::Duration;

use dl_core::config::{ConnectionProfile, SshAuth};
use dl_core::shell::shell_quote;
use dl_core::traits::ForwardSpec;

/// Secure shell client executable
pub const SSH_PROGRAM: &str = "ssh";
/// Non-interactive password feeder
pub const SSHPASS_PROGRAM: &str = "sshpass";
/// Variable `sshpass -e` reads the secret from
pub const SSHPASS_ENV: &str = "SSHPASS";

/// Deadline for the TCP and SSH handshake
const CONNECT_TIMEOUT_SECS: u64 = 10;
/// Missed keepalives before ssh gives up
const SERVER_ALIVE_COUNT_MAX: u32 = 3;

/// A fully specified external command
#[derive(Clone, PartialEq, Eq)]
pub struct SshCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl SshCommand {
    /// Build a tokio command with arguments and environment applied
    pub fn to_command(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(&self.args);
        for (key, value) in &self.env {
            command.env(key, value);
        }
        command
    }
}

impl fmt::Display for SshCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

impl fmt::Debug for SshCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env: Vec<&str> = self.env.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("SshCommand")
            .field("command", &self.to_string())
            .field("env", &env)
            .finish()
    }
}

/// Options shared by every invocation against `profile`
fn base_options(profile: &ConnectionProfile, server_alive: Duration) -> Vec<String> {
    let mut args = vec![
        "-p".to_string(),
        profile.port.to_string(),
        "-o".to_string(),
        "StrictHostKeyChecking=no".to_string(),
        "-o".to_string(),
        "UserKnownHostsFile=/dev/null".to_string(),
        "-o".to_string(),
        "LogLevel=ERROR".to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={}", CONNECT_TIMEOUT_SECS),
        "-o".to_string(),
        format!("ServerAliveInterval={}", server_alive.as_secs().max(1)),
        "-o".to_string(),
        format!("ServerAliveCountMax={}", SERVER_ALIVE_COUNT_MAX),
    ];

    match &profile.auth {
        SshAuth::Key { path, passphrase } => {
            args.push("-i".to_string());
            args.push(path.display().to_string());
            args.push("-o".to_string());
            args.push("IdentitiesOnly=yes".to_string());
            if passphrase.is_none() {
                args.push("-o".to_string());
                args.push("BatchMode=yes".to_string());
            }
        }
        SshAuth::Password(_) => {
            args.push("-o".to_string());
            args.push("PreferredAuthentications=password,keyboard-interactive".to_string());
            args.push("-o".to_string());
            args.push("PubkeyAuthentication=no".to_string());
        }
        SshAuth::Agent => {
            args.push("-o".to_string());
            args.push("BatchMode=yes".to_string());
        }
    }

    args
}

/// Wrap `ssh_args` in `sshpass` when the profile carries a secret
fn with_auth(profile: &ConnectionProfile, ssh_args: Vec<String>) -> SshCommand {
    let (prefix, secret): (&[&str], Option<&String>) = match &profile.auth {
        SshAuth::Password(password) => (&["-e"][..], Some(password)),
        SshAuth::Key {
            passphrase: Some(passphrase),
            ..
        } => (&["-P", "passphrase", "-e"][..], Some(passphrase)),
        _ => (&[][..], None),
    };

    match secret {
        Some(secret) => {
            let mut args: Vec<String> = prefix.iter().map(|s| s.to_string()).collect();
            args.push(SSH_PROGRAM.to_string());
            args.extend(ssh_args);
            SshCommand {
                program: SSHPASS_PROGRAM.to_string(),
                args,
                env: vec![(SSHPASS_ENV.to_string(), secret.clone())],
            }
        }
        None => SshCommand {
            program: SSH_PROGRAM.to_string(),
            args: ssh_args,
            env: Vec::new(),
        },
    }
}

fn destination(profile: &ConnectionProfile) -> String {
    format!("{}@{}", profile.username, profile.host)
}

/// Command that forwards the remote engine socket to a local socket
///
/// The process runs in the foreground without a remote command (`-N`) and
/// exits if the forward cannot be bound.
pub fn forward_command(spec: &ForwardSpec) -> SshCommand {
    let mut args = vec!["-nNT".to_string()];
    args.extend(base_options(&spec.profile, spec.server_alive_interval));
    args.extend([
        "-o".to_string(),
        "ExitOnForwardFailure=yes".to_string(),
        "-o".to_string(),
        "StreamLocalBindUnlink=yes".to_string(),
        "-L".to_string(),
        format!("{}:{}", spec.local_socket.display(), spec.remote_socket),
        destination(&spec.profile),
    ]);
    with_auth(&spec.profile, args)
}

/// Command that runs `command` on the profile's host, optionally in `cwd`
pub fn remote_exec_command(
    profile: &ConnectionProfile,
    command: &str,
    cwd: Option<&str>,
    server_alive: Duration,
) -> SshCommand {
    let remote = match cwd {
        Some(dir) => format!("cd {} && {}", shell_quote(dir), command),
        None => command.to_string(),
    };

    let mut args = vec!["-T".to_string()];
    args.extend(base_options(profile, server_alive));
    args.push(destination(profile));
    args.push("--".to_string());
    args.push(remote);
    with_auth(profile, args)
}
