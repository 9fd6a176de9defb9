//! Forwarding process traits

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::ConnectionProfile;
use crate::error::ConnectionError;

/// What a forwarding process should forward, and as whom
#[derive(Debug, Clone)]
pub struct ForwardSpec {
    /// Identity and network target
    pub profile: ConnectionProfile,
    /// Local socket path to create
    pub local_socket: PathBuf,
    /// Engine socket on the remote host
    pub remote_socket: String,
    /// Keepalive interval for the secure shell
    pub server_alive_interval: Duration,
}

/// A running forwarding process
pub trait ForwardProcess: Send {
    /// OS process id, if known
    fn pid(&self) -> Option<u32>;

    /// Whether the process has already exited
    fn has_exited(&mut self) -> bool;

    /// Output captured from the process so far
    fn captured_output(&self) -> String;
}

/// Starts background forwarding processes
#[async_trait]
pub trait ProcessSpawner: Send + Sync {
    /// Start forwarding `spec.remote_socket` to `spec.local_socket`
    ///
    /// Returns as soon as the process is started; the caller waits for the
    /// local socket to appear.
    async fn spawn_forward(&self, spec: &ForwardSpec)
        -> Result<Box<dyn ForwardProcess>, ConnectionError>;
}
