//! Per-profile connection manager
//!
//! A manager starts out `Uninitialized` and creates its tunnel on first use.
//! Concurrent first uses share a single acquisition. Once connected, a
//! background monitor probes the engine periodically and recreates the tunnel
//! in place when the probe fails, so callers holding the manager keep working
//! without re-fetching it. `cleanup` is terminal: a closed manager refuses
//! further use and a fresh one has to be obtained from the pool.

use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use dl_core::config::{ConnectionProfile, ConnectionSettings, Profile};
use dl_core::error::{ConnectionError, DlError};
use dl_core::process::{remove_file_if_exists, terminate_process};
use dl_core::traits::{
    EngineClient, EngineConnector, ForwardSpec, ProcessSpawner, RemoteCommandRunner,
};
use dl_core::{ConnectionStatus, RetryExecutor, SingleFlight};

use crate::engine::UnixEngineConnector;
use crate::health::{HealthHandle, HealthMonitor};
use crate::runner::{LocalCommandRunner, SshCommandRunner};
use crate::socket::socket_path_for;
use crate::spawner::SshForwardSpawner;

/// External collaborators of a connection manager
#[derive(Clone)]
pub struct ConnectionDeps {
    /// Starts forwarding processes
    pub spawner: Arc<dyn ProcessSpawner>,
    /// Builds engine clients for probes and callers
    pub connector: Arc<dyn EngineConnector>,
}

impl Default for ConnectionDeps {
    fn default() -> Self {
        Self {
            spawner: Arc::new(SshForwardSpawner::new()),
            connector: Arc::new(UnixEngineConnector),
        }
    }
}

/// Point-in-time view of a manager, for status output
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub profile: String,
    pub remote: bool,
    pub target: Option<String>,
    pub status: ConnectionStatus,
    pub endpoint: Option<PathBuf>,
    pub owner_pid: Option<u32>,
}

enum Target {
    Local,
    Remote {
        profile: ConnectionProfile,
        socket_path: PathBuf,
    },
}

struct HandleState {
    status: ConnectionStatus,
    endpoint: Option<PathBuf>,
    owner_pid: Option<u32>,
    client: Option<Arc<dyn EngineClient>>,
    health: Option<HealthHandle>,
}

struct ManagerInner {
    name: String,
    target: Target,
    settings: ConnectionSettings,
    deps: ConnectionDeps,
    retry: RetryExecutor,
    state: Mutex<HandleState>,
    creation: SingleFlight<Result<(), ConnectionError>>,
}

/// Owns the engine connection for one profile
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    fn with_target(
        name: String,
        target: Target,
        settings: ConnectionSettings,
        deps: ConnectionDeps,
    ) -> Self {
        let retry = RetryExecutor::new(settings.retry.clone());
        Self {
            inner: Arc::new(ManagerInner {
                name,
                target,
                settings,
                deps,
                retry,
                state: Mutex::new(HandleState {
                    status: ConnectionStatus::Uninitialized,
                    endpoint: None,
                    owner_pid: None,
                    client: None,
                    health: None,
                }),
                creation: SingleFlight::new(),
            }),
        }
    }

    /// Manager for the engine on this machine
    pub fn local(name: impl Into<String>, settings: ConnectionSettings, deps: ConnectionDeps) -> Self {
        Self::with_target(name.into(), Target::Local, settings, deps)
    }

    /// Manager tunnelling to a remote engine
    pub fn remote(
        profile: ConnectionProfile,
        settings: ConnectionSettings,
        deps: ConnectionDeps,
    ) -> Self {
        let socket_path = socket_path_for(&settings.socket_dir(), &profile);
        Self::with_target(
            profile.name.clone(),
            Target::Remote {
                profile,
                socket_path,
            },
            settings,
            deps,
        )
    }

    /// Manager for a resolved profile
    pub fn for_profile(profile: &Profile, settings: ConnectionSettings, deps: ConnectionDeps) -> Self {
        match profile {
            Profile::Local { name, .. } => Self::local(name.clone(), settings, deps),
            Profile::Remote(remote) => Self::remote(remote.clone(), settings, deps),
        }
    }

    /// Profile name this manager serves
    pub fn profile_name(&self) -> &str {
        &self.inner.name
    }

    /// Whether this manager tunnels to another host
    pub fn is_remote(&self) -> bool {
        matches!(self.inner.target, Target::Remote { .. })
    }

    /// Remote profile, if any
    pub fn remote_profile(&self) -> Option<&ConnectionProfile> {
        match &self.inner.target {
            Target::Remote { profile, .. } => Some(profile),
            Target::Local => None,
        }
    }

    /// Local socket the tunnel forwards to, for remote managers
    pub fn socket_path(&self) -> Option<&Path> {
        match &self.inner.target {
            Target::Remote { socket_path, .. } => Some(socket_path),
            Target::Local => None,
        }
    }

    /// Settings this manager was built with
    pub fn settings(&self) -> &ConnectionSettings {
        &self.inner.settings
    }

    /// Current lifecycle status
    pub fn status(&self) -> ConnectionStatus {
        self.inner.lock().status
    }

    /// Engine endpoint, once connected
    pub fn endpoint(&self) -> Option<PathBuf> {
        self.inner.lock().endpoint.clone()
    }

    /// Pid of the forwarding process this manager started, if any
    pub fn owner_pid(&self) -> Option<u32> {
        self.inner.lock().owner_pid
    }

    /// Snapshot for display
    pub fn info(&self) -> ConnectionInfo {
        let state = self.inner.lock();
        ConnectionInfo {
            profile: self.inner.name.clone(),
            remote: self.is_remote(),
            target: self.remote_profile().map(ConnectionProfile::target),
            status: state.status,
            endpoint: state.endpoint.clone(),
            owner_pid: state.owner_pid,
        }
    }

    /// Make sure the connection is usable, creating the tunnel if needed
    ///
    /// Concurrent callers share one acquisition. A failed acquisition is not
    /// cached: the next call starts a new one.
    pub async fn ensure_connected(&self) -> Result<(), ConnectionError> {
        self.inner.ensure().await
    }

    /// Engine client for this connection
    ///
    /// A health check may drop the client between acquisition and this call
    /// reading it; the manager is then reconnected rather than reported
    /// closed. A closed manager fails inside `ensure_connected`.
    pub async fn engine(&self) -> Result<Arc<dyn EngineClient>, ConnectionError> {
        loop {
            self.ensure_connected().await?;
            let client = self.inner.lock().client.clone();
            if let Some(client) = client {
                return Ok(client);
            }
            tracing::debug!("Client for '{}' dropped while reconnecting; retrying", self.inner.name);
        }
    }

    /// Command runner targeting the host this manager serves
    pub fn runner(&self) -> Arc<dyn RemoteCommandRunner> {
        let settings = &self.inner.settings;
        match &self.inner.target {
            Target::Remote { profile, .. } => Arc::new(SshCommandRunner::new(
                profile.clone(),
                settings.remote_command_timeout(),
                settings.server_alive_interval,
            )),
            Target::Local => Arc::new(LocalCommandRunner::new(settings.command_timeout)),
        }
    }

    /// Run `op` against this connection
    ///
    /// Remote connections run it under the retry policy, re-establishing the
    /// tunnel before each attempt if it dropped. Local connections run it
    /// once.
    pub async fn execute<T, E, F, Fut>(&self, mut op: F) -> Result<T, DlError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<DlError>,
    {
        if !self.is_remote() {
            self.ensure_connected().await?;
            return op().await.map_err(Into::into);
        }

        self.inner
            .retry
            .run(|| {
                let attempt = op();
                async move {
                    self.ensure_connected().await.map_err(DlError::from)?;
                    attempt.await.map_err(Into::<DlError>::into)
                }
            })
            .await
            .map_err(DlError::from)
    }

    /// Probe the engine now, recreating the tunnel if the probe fails
    pub async fn health_check(&self) -> Result<(), ConnectionError> {
        self.inner.health_check().await
    }

    /// Tear the connection down
    ///
    /// Stops the health monitor, terminates the forwarding process this
    /// manager started and removes the local socket. Idempotent.
    pub fn cleanup(&self) {
        self.inner.cleanup();
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("profile", &self.inner.name)
            .field("remote", &self.is_remote())
            .field("status", &self.status())
            .finish()
    }
}

impl ManagerInner {
    fn lock(&self) -> MutexGuard<'_, HandleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn closed(&self) -> ConnectionError {
        ConnectionError::Closed(self.name.clone())
    }

    async fn ensure(self: &Arc<Self>) -> Result<(), ConnectionError> {
        match &self.target {
            Target::Local => {
                let mut state = self.lock();
                if state.status == ConnectionStatus::Closed {
                    return Err(self.closed());
                }
                if state.client.is_none() {
                    let endpoint = self.settings.local_engine_socket.clone();
                    state.client = Some(self.deps.connector.connect(&endpoint));
                    state.endpoint = Some(endpoint);
                    state.status = ConnectionStatus::Connected;
                }
                Ok(())
            }
            Target::Remote { socket_path, .. } => {
                {
                    let state = self.lock();
                    match state.status {
                        ConnectionStatus::Closed => return Err(self.closed()),
                        status if status.is_usable()
                            && state.client.is_some()
                            && socket_path.exists() =>
                        {
                            return Ok(())
                        }
                        _ => {}
                    }
                }

                let inner = Arc::clone(self);
                self.creation.run(move || inner.acquire()).await
            }
        }
    }

    async fn acquire(self: Arc<Self>) -> Result<(), ConnectionError> {
        let Target::Remote {
            profile,
            socket_path,
        } = &self.target
        else {
            return Ok(());
        };

        if !cfg!(unix) {
            return Err(ConnectionError::UnsupportedPlatform(
                std::env::consts::OS.to_string(),
            ));
        }

        {
            let mut state = self.lock();
            if state.status == ConnectionStatus::Closed {
                return Err(self.closed());
            }
            state.status = ConnectionStatus::Connecting;
            state.client = None;
        }

        match self.establish(profile, socket_path).await {
            Ok(pid) => {
                let mut state = self.lock();
                if state.status == ConnectionStatus::Closed {
                    drop(state);
                    tracing::info!(
                        "Connection '{}' closed during acquisition; discarding new tunnel",
                        self.name
                    );
                    self.teardown(pid, socket_path);
                    return Err(self.closed());
                }

                state.status = ConnectionStatus::Connected;
                state.endpoint = Some(socket_path.clone());
                state.owner_pid = pid;
                state.client = Some(self.deps.connector.connect(socket_path));

                let monitor_running = state.health.as_ref().is_some_and(|h| !h.is_finished());
                if !monitor_running {
                    state.health = Some(Self::start_health_monitor(&self));
                }
                drop(state);

                tracing::info!(
                    "Connection '{}' ready at {}",
                    self.name,
                    socket_path.display()
                );
                Ok(())
            }
            Err(e) => {
                let mut state = self.lock();
                if state.status != ConnectionStatus::Closed {
                    state.status = ConnectionStatus::Degraded;
                }
                state.client = None;
                drop(state);

                tracing::warn!("Failed to connect '{}': {}", self.name, e);
                Err(e)
            }
        }
    }

    /// Bring up the tunnel, returning the pid of a newly started process
    async fn establish(
        &self,
        profile: &ConnectionProfile,
        socket_path: &Path,
    ) -> Result<Option<u32>, ConnectionError> {
        if socket_path.exists() {
            match self.probe(socket_path).await {
                Ok(()) => {
                    tracing::info!(
                        "Reusing live tunnel for '{}' at {}",
                        self.name,
                        socket_path.display()
                    );
                    return Ok(self.lock().owner_pid);
                }
                Err(e) => {
                    tracing::warn!("Removing stale socket {}: {}", socket_path.display(), e);
                    if let Err(e) = remove_file_if_exists(socket_path) {
                        tracing::warn!("Failed to remove {}: {}", socket_path.display(), e);
                    }
                }
            }
        }

        let previous = self.lock().owner_pid.take();
        if let Some(pid) = previous {
            tracing::debug!("Terminating previous tunnel process {}", pid);
            if let Err(e) = terminate_process(pid) {
                tracing::warn!("Failed to terminate tunnel process {}: {}", pid, e);
            }
        }

        let tunnel_failed = |reason: String, output: String| ConnectionError::TunnelFailed {
            target: profile.target(),
            reason,
            output,
        };

        if let Some(dir) = socket_path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| {
                tunnel_failed(
                    format!("cannot create socket directory {}: {}", dir.display(), e),
                    String::new(),
                )
            })?;
        }

        let spec = ForwardSpec {
            profile: profile.clone(),
            local_socket: socket_path.to_path_buf(),
            remote_socket: self.settings.remote_engine_socket.clone(),
            server_alive_interval: self.settings.server_alive_interval,
        };
        let mut process = self.deps.spawner.spawn_forward(&spec).await?;
        let pid = process.pid();

        // Recorded before polling so that cleanup can signal the process even
        // if this acquisition is abandoned mid-poll
        {
            let mut state = self.lock();
            if state.status == ConnectionStatus::Closed {
                drop(state);
                self.teardown(pid, socket_path);
                return Err(self.closed());
            }
            state.owner_pid = pid;
        }

        let deadline = Instant::now() + self.settings.tunnel_ready_timeout;
        loop {
            if socket_path.exists() {
                return Ok(pid);
            }
            if process.has_exited() {
                self.forget_pid(pid);
                return Err(tunnel_failed(
                    "forwarding process exited before the socket appeared".to_string(),
                    process.captured_output(),
                ));
            }
            if Instant::now() >= deadline {
                let output = process.captured_output();
                self.teardown(pid, socket_path);
                self.forget_pid(pid);
                return Err(tunnel_failed(
                    format!(
                        "socket {} did not appear within {:?}",
                        socket_path.display(),
                        self.settings.tunnel_ready_timeout
                    ),
                    output,
                ));
            }
            tokio::time::sleep(self.settings.tunnel_poll_interval).await;
        }
    }

    async fn probe(&self, endpoint: &Path) -> Result<(), ConnectionError> {
        let client = self.deps.connector.connect(endpoint);
        let probe_failed = |reason: String| ConnectionError::Probe {
            endpoint: endpoint.display().to_string(),
            reason,
        };

        match tokio::time::timeout(self.settings.probe_timeout, client.ping()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(probe_failed(e.to_string())),
            Err(_) => Err(probe_failed(format!(
                "no answer within {:?}",
                self.settings.probe_timeout
            ))),
        }
    }

    async fn health_check(self: &Arc<Self>) -> Result<(), ConnectionError> {
        let Target::Remote { socket_path, .. } = &self.target else {
            return Ok(());
        };

        let (status, client) = {
            let state = self.lock();
            (state.status, state.client.clone())
        };
        if status == ConnectionStatus::Closed {
            return Err(self.closed());
        }
        if self.creation.is_in_flight() {
            tracing::debug!("Skipping health check for '{}': acquisition in progress", self.name);
            return Ok(());
        }

        let failure = match client {
            Some(_) if status == ConnectionStatus::Connected => match self.probe(socket_path).await {
                Ok(()) => return Ok(()),
                Err(e) => e.to_string(),
            },
            _ => format!("connection is {}", status),
        };

        tracing::warn!(
            "Health check failed for '{}': {}; recreating tunnel",
            self.name,
            failure
        );
        {
            let mut state = self.lock();
            if state.status == ConnectionStatus::Closed {
                return Err(self.closed());
            }
            state.status = ConnectionStatus::Degraded;
            state.client = None;
        }
        self.ensure().await
    }

    fn start_health_monitor(this: &Arc<Self>) -> HealthHandle {
        let weak: Weak<Self> = Arc::downgrade(this);
        HealthMonitor::new(this.settings.health_check_interval).spawn_monitor(
            CancellationToken::new(),
            move || {
                weak.upgrade().map(|inner| async move {
                    if let Err(e) = inner.health_check().await {
                        tracing::warn!("Recovery of '{}' failed: {}", inner.name, e);
                    }
                })
            },
        )
    }

    fn forget_pid(&self, pid: Option<u32>) {
        let mut state = self.lock();
        if state.owner_pid == pid {
            state.owner_pid = None;
        }
    }

    fn teardown(&self, pid: Option<u32>, socket_path: &Path) {
        if let Some(pid) = pid {
            if let Err(e) = terminate_process(pid) {
                tracing::warn!("Failed to terminate tunnel process {}: {}", pid, e);
            }
        }
        if let Err(e) = remove_file_if_exists(socket_path) {
            tracing::warn!("Failed to remove {}: {}", socket_path.display(), e);
        }
    }

    fn cleanup(&self) {
        let (health, pid, was) = {
            let mut state = self.lock();
            let was = state.status;
            state.status = ConnectionStatus::Closed;
            state.client = None;
            state.endpoint = None;
            (state.health.take(), state.owner_pid.take(), was)
        };

        if let Some(health) = health {
            health.cancel();
        }
        if let Target::Remote { socket_path, .. } = &self.target {
            self.teardown(pid, socket_path);
        }
        if was != ConnectionStatus::Closed {
            tracing::info!("Closed connection '{}'", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{remote_profile, test_settings, FakeConnector, FakeSpawner};
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    fn manager(dir: &TempDir, spawner: &Arc<FakeSpawner>, connector: &Arc<FakeConnector>) -> ConnectionManager {
        ConnectionManager::remote(
            remote_profile("prod"),
            test_settings(dir.path()),
            ConnectionDeps {
                spawner: Arc::clone(spawner) as Arc<dyn ProcessSpawner>,
                connector: Arc::clone(connector) as Arc<dyn EngineConnector>,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_spawn_once() {
        let dir = TempDir::new().unwrap();
        let spawner = Arc::new(FakeSpawner::new().with_delay(Duration::from_millis(50)));
        let connector = Arc::new(FakeConnector::new());
        let manager = manager(&dir, &spawner, &connector);

        assert_eq!(manager.status(), ConnectionStatus::Uninitialized);
        let results = futures::future::join_all((0..5).map(|_| manager.ensure_connected())).await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(spawner.spawns(), 1);
        assert_eq!(manager.status(), ConnectionStatus::Connected);
        assert_eq!(manager.endpoint().as_deref(), manager.socket_path());
        assert_eq!(manager.owner_pid(), Some(crate::testing::FAKE_PID));
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_socket_is_reused() {
        let dir = TempDir::new().unwrap();
        let spawner = Arc::new(FakeSpawner::new());
        let connector = Arc::new(FakeConnector::new());
        let manager = manager(&dir, &spawner, &connector);

        std::fs::write(manager.socket_path().unwrap(), b"").unwrap();
        manager.ensure_connected().await.unwrap();

        assert_eq!(spawner.spawns(), 0);
        assert_eq!(connector.pings(), 1);
        assert_eq!(manager.status(), ConnectionStatus::Connected);
        assert_eq!(manager.owner_pid(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_socket_is_replaced() {
        let dir = TempDir::new().unwrap();
        let spawner = Arc::new(FakeSpawner::new());
        let connector = Arc::new(FakeConnector::new());
        connector.fail_next_pings(1);
        let manager = manager(&dir, &spawner, &connector);

        std::fs::write(manager.socket_path().unwrap(), b"").unwrap();
        manager.ensure_connected().await.unwrap();

        assert_eq!(spawner.spawns(), 1);
        assert_eq!(manager.status(), ConnectionStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_socket_timeout_reports_output() {
        let dir = TempDir::new().unwrap();
        let spawner = Arc::new(
            FakeSpawner::new()
                .without_socket()
                .with_output("bind: Address already in use"),
        );
        let connector = Arc::new(FakeConnector::new());
        let manager = manager(&dir, &spawner, &connector);

        let started = Instant::now();
        let err = manager.ensure_connected().await.unwrap_err();

        assert!(matches!(err, ConnectionError::TunnelFailed { .. }));
        assert!(err.to_string().contains("Address already in use"));
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(manager.status(), ConnectionStatus::Degraded);
        assert_eq!(manager.owner_pid(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pid_recorded_while_polling() {
        let dir = TempDir::new().unwrap();
        let spawner = Arc::new(FakeSpawner::new().without_socket());
        let connector = Arc::new(FakeConnector::new());
        let manager = manager(&dir, &spawner, &connector);

        let waited =
            tokio::time::timeout(Duration::from_millis(300), manager.ensure_connected()).await;

        assert!(waited.is_err());
        assert_eq!(manager.status(), ConnectionStatus::Connecting);
        assert_eq!(manager.owner_pid(), Some(crate::testing::FAKE_PID));

        manager.cleanup();
        assert_eq!(manager.owner_pid(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cleanup_terminates_forwarder_of_abandoned_acquisition() {
        let dir = TempDir::new().unwrap();
        let spawner = Arc::new(crate::testing::SleepSpawner::new());
        let manager = ConnectionManager::remote(
            remote_profile("prod"),
            test_settings(dir.path()),
            ConnectionDeps {
                spawner: Arc::clone(&spawner) as Arc<dyn ProcessSpawner>,
                connector: Arc::new(FakeConnector::new()),
            },
        );

        let waited =
            tokio::time::timeout(Duration::from_millis(300), manager.ensure_connected()).await;
        assert!(waited.is_err());
        let pid = manager.owner_pid();
        assert!(pid.is_some());

        manager.cleanup();
        assert_eq!(manager.status(), ConnectionStatus::Closed);

        let mut child = spawner.take_child().unwrap();
        assert_eq!(child.id(), pid);
        let status = tokio::time::timeout(Duration::from_secs(5), child.wait())
            .await
            .expect("forwarding process still running after cleanup")
            .unwrap();
        assert!(!status.success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_exit_reports_output() {
        let dir = TempDir::new().unwrap();
        let spawner = Arc::new(
            FakeSpawner::new()
                .without_socket()
                .exiting_early()
                .with_output("Permission denied (publickey)"),
        );
        let connector = Arc::new(FakeConnector::new());
        let manager = manager(&dir, &spawner, &connector);

        let started = Instant::now();
        let err = manager.ensure_connected().await.unwrap_err();

        assert!(err.to_string().contains("Permission denied (publickey)"));
        assert!(err.to_string().contains("exited"));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(manager.owner_pid(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_reconnects_when_client_dropped() {
        let dir = TempDir::new().unwrap();
        let spawner = Arc::new(FakeSpawner::new());
        let connector = Arc::new(FakeConnector::new());
        let manager = manager(&dir, &spawner, &connector);

        manager.ensure_connected().await.unwrap();
        {
            // What a failed health probe leaves behind
            let mut state = manager.inner.lock();
            state.status = ConnectionStatus::Degraded;
            state.client = None;
        }

        let engine = manager.engine().await.unwrap();
        engine.ping().await.unwrap();
        assert_eq!(manager.status(), ConnectionStatus::Connected);
        assert_eq!(spawner.spawns(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_acquisition_is_not_cached() {
        let dir = TempDir::new().unwrap();
        let spawner = Arc::new(FakeSpawner::new().failing_first(1));
        let connector = Arc::new(FakeConnector::new());
        let manager = manager(&dir, &spawner, &connector);

        assert!(manager.ensure_connected().await.is_err());
        assert_eq!(manager.status(), ConnectionStatus::Degraded);

        manager.ensure_connected().await.unwrap();
        assert_eq!(spawner.spawns(), 2);
        assert_eq!(manager.status(), ConnectionStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_is_idempotent_and_terminal() {
        let dir = TempDir::new().unwrap();
        let spawner = Arc::new(FakeSpawner::new());
        let connector = Arc::new(FakeConnector::new());
        let manager = manager(&dir, &spawner, &connector);

        manager.ensure_connected().await.unwrap();
        let socket = manager.socket_path().unwrap().to_path_buf();
        assert!(socket.exists());

        manager.cleanup();
        assert_eq!(manager.status(), ConnectionStatus::Closed);
        assert!(!socket.exists());
        assert_eq!(manager.owner_pid(), None);

        manager.cleanup();
        assert_eq!(manager.status(), ConnectionStatus::Closed);

        let err = manager.ensure_connected().await.unwrap_err();
        assert_eq!(err, ConnectionError::Closed("prod".to_string()));
        assert_eq!(spawner.spawns(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_during_acquisition_discards_tunnel() {
        let dir = TempDir::new().unwrap();
        let spawner = Arc::new(FakeSpawner::new().with_delay(Duration::from_millis(100)));
        let connector = Arc::new(FakeConnector::new());
        let manager = Arc::new(manager(&dir, &spawner, &connector));

        let pending = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.ensure_connected().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        manager.cleanup();

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, ConnectionError::Closed(_)));
        assert_eq!(manager.status(), ConnectionStatus::Closed);
        assert!(!manager.socket_path().unwrap().exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_check_recreates_in_place() {
        let dir = TempDir::new().unwrap();
        let spawner = Arc::new(FakeSpawner::new());
        let connector = Arc::new(FakeConnector::new());
        let manager = manager(&dir, &spawner, &connector);

        manager.ensure_connected().await.unwrap();
        manager.health_check().await.unwrap();
        assert_eq!(spawner.spawns(), 1);

        // Tunnel died underneath us
        std::fs::remove_file(manager.socket_path().unwrap()).unwrap();
        manager.health_check().await.unwrap();

        assert_eq!(spawner.spawns(), 2);
        assert_eq!(manager.status(), ConnectionStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_monitor_recovers() {
        let dir = TempDir::new().unwrap();
        let spawner = Arc::new(FakeSpawner::new());
        let connector = Arc::new(FakeConnector::new());
        let manager = manager(&dir, &spawner, &connector);

        manager.ensure_connected().await.unwrap();
        // Both the monitor's probe and the reuse probe fail
        connector.fail_next_pings(2);

        tokio::time::sleep(Duration::from_secs(31)).await;

        assert_eq!(spawner.spawns(), 2);
        assert_eq!(manager.status(), ConnectionStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_execute_retries() {
        let dir = TempDir::new().unwrap();
        let spawner = Arc::new(FakeSpawner::new());
        let connector = Arc::new(FakeConnector::new());
        let manager = manager(&dir, &spawner, &connector);

        let counter = AtomicU32::new(0);
        let calls = &counter;
        let value = manager
            .execute(move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
                } else {
                    Ok(42)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(spawner.spawns(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_execute_runs_once() {
        let dir = TempDir::new().unwrap();
        let manager = ConnectionManager::local(
            "local",
            test_settings(dir.path()),
            ConnectionDeps {
                spawner: Arc::new(FakeSpawner::new()),
                connector: Arc::new(FakeConnector::new()),
            },
        );

        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), DlError> = manager
            .execute(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
            })
            .await;

        assert!(matches!(result, Err(DlError::Io(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(manager.status(), ConnectionStatus::Connected);
        assert!(manager.socket_path().is_none());
    }

    #[tokio::test]
    async fn test_local_cleanup_only_closes() {
        let dir = TempDir::new().unwrap();
        let manager = ConnectionManager::local(
            "local",
            test_settings(dir.path()),
            ConnectionDeps {
                spawner: Arc::new(FakeSpawner::new()),
                connector: Arc::new(FakeConnector::new()),
            },
        );
        manager.ensure_connected().await.unwrap();
        manager.cleanup();
        manager.cleanup();
        assert_eq!(manager.status(), ConnectionStatus::Closed);
    }
}
