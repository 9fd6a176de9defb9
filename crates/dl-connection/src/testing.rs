//! In-process fakes for the spawner and engine connector

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dl_core::config::{ConnectionProfile, ConnectionSettings, SshAuth};
use dl_core::error::{ConnectionError, EngineError};
use dl_core::traits::{EngineClient, EngineConnector, ForwardProcess, ForwardSpec, ProcessSpawner};

/// Pid reported by fake processes; far above any real pid_max
pub const FAKE_PID: u32 = 999_999_999;

pub fn remote_profile(name: &str) -> ConnectionProfile {
    ConnectionProfile {
        name: name.to_string(),
        host: "docker.example.com".to_string(),
        port: 22,
        username: "deploy".to_string(),
        auth: SshAuth::Agent,
        projects_path: Some("/srv".to_string()),
    }
}

pub fn test_settings(socket_dir: &Path) -> ConnectionSettings {
    ConnectionSettings {
        tunnel_ready_timeout: Duration::from_secs(2),
        socket_dir: Some(socket_dir.to_path_buf()),
        ..Default::default()
    }
}

/// Spawner that "forwards" by creating the socket file itself
pub struct FakeSpawner {
    spawns: AtomicUsize,
    failures_left: AtomicUsize,
    create_socket: bool,
    exit_early: bool,
    delay: Duration,
    output: String,
}

impl FakeSpawner {
    pub fn new() -> Self {
        Self {
            spawns: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
            create_socket: true,
            exit_early: false,
            delay: Duration::ZERO,
            output: String::new(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn without_socket(mut self) -> Self {
        self.create_socket = false;
        self
    }

    pub fn exiting_early(mut self) -> Self {
        self.exit_early = true;
        self
    }

    pub fn with_output(mut self, output: &str) -> Self {
        self.output = output.to_string();
        self
    }

    pub fn failing_first(self, count: usize) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    pub fn spawns(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessSpawner for FakeSpawner {
    async fn spawn_forward(
        &self,
        spec: &ForwardSpec,
    ) -> Result<Box<dyn ForwardProcess>, ConnectionError> {
        self.spawns.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ConnectionError::Spawn("ssh: command not found".to_string()));
        }

        if self.create_socket {
            std::fs::write(&spec.local_socket, b"").map_err(|e| ConnectionError::Spawn(e.to_string()))?;
        }
        Ok(Box::new(FakeProcess {
            exited: self.exit_early,
            output: self.output.clone(),
        }))
    }
}

struct FakeProcess {
    exited: bool,
    output: String,
}

impl ForwardProcess for FakeProcess {
    fn pid(&self) -> Option<u32> {
        Some(FAKE_PID)
    }

    fn has_exited(&mut self) -> bool {
        self.exited
    }

    fn captured_output(&self) -> String {
        self.output.clone()
    }
}

/// Spawner that starts a real long-running process which never creates the
/// socket
///
/// Children are kept so a test can wait for them to be signalled.
#[cfg(unix)]
#[derive(Default)]
pub struct SleepSpawner {
    children: std::sync::Mutex<Vec<tokio::process::Child>>,
}

#[cfg(unix)]
impl SleepSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the child started first
    pub fn take_child(&self) -> Option<tokio::process::Child> {
        let mut children = self.children.lock().unwrap();
        (!children.is_empty()).then(|| children.remove(0))
    }
}

#[cfg(unix)]
#[async_trait]
impl ProcessSpawner for SleepSpawner {
    async fn spawn_forward(
        &self,
        _spec: &ForwardSpec,
    ) -> Result<Box<dyn ForwardProcess>, ConnectionError> {
        let child = tokio::process::Command::new("sleep")
            .arg("30")
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ConnectionError::Spawn(e.to_string()))?;
        let pid = child.id();
        self.children.lock().unwrap().push(child);
        Ok(Box::new(SleepProcess { pid }))
    }
}

#[cfg(unix)]
struct SleepProcess {
    pid: Option<u32>,
}

#[cfg(unix)]
impl ForwardProcess for SleepProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn has_exited(&mut self) -> bool {
        false
    }

    fn captured_output(&self) -> String {
        String::new()
    }
}

/// Connector whose engines answer pings while their socket file exists
#[derive(Default)]
pub struct FakeConnector {
    failing_pings: Arc<AtomicUsize>,
    pings: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` pings fail regardless of the socket
    pub fn fail_next_pings(&self, count: usize) {
        self.failing_pings.store(count, Ordering::SeqCst);
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }
}

impl EngineConnector for FakeConnector {
    fn connect(&self, endpoint: &Path) -> Arc<dyn EngineClient> {
        Arc::new(FakeEngine {
            endpoint: endpoint.to_path_buf(),
            failing_pings: Arc::clone(&self.failing_pings),
            pings: Arc::clone(&self.pings),
        })
    }
}

struct FakeEngine {
    endpoint: PathBuf,
    failing_pings: Arc<AtomicUsize>,
    pings: Arc<AtomicUsize>,
}

impl FakeEngine {
    fn unreachable(&self, kind: io::ErrorKind) -> EngineError {
        EngineError::Unreachable {
            path: self.endpoint.display().to_string(),
            source: io::Error::new(kind, "fake engine"),
        }
    }
}

#[async_trait]
impl EngineClient for FakeEngine {
    async fn ping(&self) -> Result<(), EngineError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_pings
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(self.unreachable(io::ErrorKind::ConnectionRefused));
        }
        if !self.endpoint.exists() {
            return Err(self.unreachable(io::ErrorKind::NotFound));
        }
        Ok(())
    }

    async fn get(&self, _path: &str) -> Result<String, EngineError> {
        self.ping().await.map(|()| "{}".to_string())
    }

    fn endpoint(&self) -> &Path {
        &self.endpoint
    }
}
