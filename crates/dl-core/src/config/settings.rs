//! Connection tuning settings

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};

/// Well-known engine socket on the remote host
pub const DEFAULT_REMOTE_ENGINE_SOCKET: &str = "/var/run/docker.sock";

/// Timings and paths shared by every connection manager in a pool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionSettings {
    /// How long to wait for the forwarded socket to appear
    #[serde(with = "duration_millis")]
    pub tunnel_ready_timeout: Duration,

    /// How often to look for the forwarded socket while waiting
    #[serde(with = "duration_millis")]
    pub tunnel_poll_interval: Duration,

    /// Interval between background liveness probes
    #[serde(with = "duration_secs")]
    pub health_check_interval: Duration,

    /// Deadline for a single liveness probe
    #[serde(with = "duration_millis")]
    pub probe_timeout: Duration,

    /// SSH keepalive interval passed to the forwarding process
    #[serde(with = "duration_secs")]
    pub server_alive_interval: Duration,

    /// Default deadline for commands that do not set one
    ///
    /// Remote commands also run under `retry.timeout`; see
    /// [`ConnectionSettings::remote_command_timeout`].
    #[serde(with = "duration_secs")]
    pub command_timeout: Duration,

    /// Engine socket path on the remote host
    pub remote_engine_socket: String,

    /// Engine socket path for local (non-tunneled) connections
    pub local_engine_socket: PathBuf,

    /// Directory for forwarded sockets (defaults to the system temp dir)
    pub socket_dir: Option<PathBuf>,

    /// Retry policy applied to every tunneled call
    pub retry: RetryPolicy,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            tunnel_ready_timeout: Duration::from_secs(10),
            tunnel_poll_interval: Duration::from_millis(100),
            health_check_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            server_alive_interval: Duration::from_secs(30),
            command_timeout: Duration::from_secs(25),
            remote_engine_socket: DEFAULT_REMOTE_ENGINE_SOCKET.to_string(),
            local_engine_socket: PathBuf::from(DEFAULT_REMOTE_ENGINE_SOCKET),
            socket_dir: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl ConnectionSettings {
    /// Directory holding forwarded sockets
    pub fn socket_dir(&self) -> PathBuf {
        self.socket_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Deadline for a remote command
    ///
    /// Kept below the per-attempt retry deadline so the command's own
    /// timeout fires, and its process is killed, before the attempt is
    /// abandoned.
    pub fn remote_command_timeout(&self) -> Duration {
        let attempt = self.retry.timeout;
        if self.command_timeout < attempt {
            self.command_timeout
        } else {
            attempt.saturating_sub(Duration::from_secs(1)).max(attempt / 2)
        }
    }
}

/// Bounded retry with exponential backoff and a per-attempt deadline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,

    /// Deadline for each attempt; hitting it is never retried
    #[serde(with = "duration_millis")]
    pub timeout: Duration,

    /// Delay before the second attempt
    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,

    /// Multiplier applied to the delay after each retry
    pub backoff_multiplier: f64,

    /// Upper bound for a single delay
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(30),
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}
