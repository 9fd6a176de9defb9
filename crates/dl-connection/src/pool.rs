//! Connection pool keyed by profile name

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use dl_core::config::{configuration_hint, ConnectionSettings, Profile, ProfileConfig};
use dl_core::error::ConfigError;
use dl_core::traits::RemoteCommandRunner;
use dl_core::ConnectionStatus;

use crate::manager::{ConnectionDeps, ConnectionManager};

/// Name used for the implicit local connection
pub const LOCAL_CONNECTION_NAME: &str = "local";

/// Pool slot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PoolKey {
    /// The engine on this machine, used when no profile is named
    Local,
    /// A named profile
    Profile(String),
}

/// Pool of connection managers, one per profile
///
/// Repeated lookups of the same profile return the same manager, so its
/// tunnel is shared. Distinct profiles never share a manager even when
/// they point at the same host.
pub struct ConnectionPool {
    /// Loaded profiles, if any were configured
    config: Option<ProfileConfig>,
    /// Settings handed to every manager
    settings: ConnectionSettings,
    /// Collaborators handed to every manager
    deps: ConnectionDeps,
    /// Managers indexed by key
    connections: DashMap<PoolKey, Arc<ConnectionManager>>,
}

impl ConnectionPool {
    /// Create a pool using the system `ssh` and engine sockets
    pub fn new(config: Option<ProfileConfig>) -> Self {
        Self::with_deps(config, ConnectionDeps::default())
    }

    /// Create a pool with explicit collaborators
    pub fn with_deps(config: Option<ProfileConfig>, deps: ConnectionDeps) -> Self {
        let settings = config
            .as_ref()
            .map(|c| c.settings().clone())
            .unwrap_or_default();
        Self {
            config,
            settings,
            deps,
            connections: DashMap::new(),
        }
    }

    /// Create a pool from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(ProfileConfig::from_env()?))
    }

    /// Get the manager for `profile`, creating it on first use
    ///
    /// `None` selects the local engine. Naming a profile that is not
    /// configured is an error; there is no silent fallback to local.
    pub fn get(&self, profile: Option<&str>) -> Result<Arc<ConnectionManager>, ConfigError> {
        let (key, resolved) = match profile {
            None => (
                PoolKey::Local,
                Profile::Local {
                    name: LOCAL_CONNECTION_NAME.to_string(),
                    projects_path: None,
                },
            ),
            Some(name) => {
                let config = self.config.as_ref().ok_or_else(|| ConfigError::NotConfigured {
                    profile: name.to_string(),
                    hint: configuration_hint(),
                })?;
                (PoolKey::Profile(name.to_string()), config.resolve(name)?)
            }
        };

        let create = || {
            tracing::debug!("Creating connection manager for {:?}", key);
            Arc::new(ConnectionManager::for_profile(
                &resolved,
                self.settings.clone(),
                self.deps.clone(),
            ))
        };

        let manager = match self.connections.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().status() == ConnectionStatus::Closed {
                    entry.insert(create());
                }
                Arc::clone(entry.get())
            }
            Entry::Vacant(entry) => Arc::clone(entry.insert(create()).value()),
        };
        Ok(manager)
    }

    /// Command runner for the host `profile` points at
    pub fn runner_for(
        &self,
        profile: Option<&str>,
    ) -> Result<Arc<dyn RemoteCommandRunner>, ConfigError> {
        Ok(self.get(profile)?.runner())
    }

    /// Close every connection and empty the pool
    pub fn clear(&self) {
        for entry in self.connections.iter() {
            entry.value().cleanup();
        }
        self.connections.clear();
    }

    /// Loaded profile configuration
    pub fn config(&self) -> Option<&ProfileConfig> {
        self.config.as_ref()
    }

    /// Default profile named by the configuration
    pub fn default_profile(&self) -> Option<&str> {
        self.config.as_ref().and_then(ProfileConfig::default_profile)
    }

    /// Configured profile names
    pub fn profile_names(&self) -> Vec<String> {
        self.config
            .as_ref()
            .map(ProfileConfig::names)
            .unwrap_or_default()
    }

    /// Number of pooled managers
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if pool is empty
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_settings, FakeConnector, FakeSpawner};
    use dl_core::config::{ProfileEntry, ProfileMode, ProfileSource, ProfilesFile};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn remote_entry(host: &str, user: &str) -> ProfileEntry {
        ProfileEntry {
            mode: ProfileMode::Remote,
            host: Some(host.to_string()),
            username: Some(user.to_string()),
            ..Default::default()
        }
    }

    fn pool(dir: &TempDir, spawner: &Arc<FakeSpawner>) -> ConnectionPool {
        let mut profiles = BTreeMap::new();
        profiles.insert("a".to_string(), remote_entry("h1", "deploy"));
        profiles.insert("b".to_string(), remote_entry("h1", "deploy"));
        profiles.insert(
            "laptop".to_string(),
            ProfileEntry {
                mode: ProfileMode::Local,
                ..Default::default()
            },
        );
        let config = ProfileConfig::new(
            ProfileSource::Environment,
            ProfilesFile {
                default: Some("a".to_string()),
                profiles,
                settings: test_settings(dir.path()),
            },
        );
        ConnectionPool::with_deps(
            Some(config),
            ConnectionDeps {
                spawner: Arc::clone(spawner) as _,
                connector: Arc::new(FakeConnector::new()),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_profile_same_manager() {
        let dir = TempDir::new().unwrap();
        let spawner = Arc::new(FakeSpawner::new());
        let pool = pool(&dir, &spawner);

        let first = pool.get(Some("a")).unwrap();
        let second = pool.get(Some("a")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        first.ensure_connected().await.unwrap();
        second.ensure_connected().await.unwrap();
        assert_eq!(spawner.spawns(), 1);
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_profiles_are_isolated() {
        let dir = TempDir::new().unwrap();
        let spawner = Arc::new(FakeSpawner::new());
        let pool = pool(&dir, &spawner);

        let a = pool.get(Some("a")).unwrap();
        let b = pool.get(Some("b")).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_ne!(a.socket_path(), b.socket_path());

        a.ensure_connected().await.unwrap();
        b.ensure_connected().await.unwrap();
        assert_eq!(spawner.spawns(), 2);

        a.cleanup();
        assert_eq!(b.status(), ConnectionStatus::Connected);
    }

    #[test]
    fn test_unknown_profile_fails() {
        let dir = TempDir::new().unwrap();
        let pool = pool(&dir, &Arc::new(FakeSpawner::new()));

        let err = pool.get(Some("ghost")).unwrap_err();
        assert!(matches!(err, ConfigError::ProfileNotFound { .. }));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_profile_without_config_fails() {
        let pool = ConnectionPool::with_deps(
            None,
            ConnectionDeps {
                spawner: Arc::new(FakeSpawner::new()),
                connector: Arc::new(FakeConnector::new()),
            },
        );

        let err = pool.get(Some("prod")).unwrap_err();
        assert!(matches!(err, ConfigError::NotConfigured { .. }));
        assert!(err.to_string().contains("DOCKLINE_PROFILES"));

        let local = pool.get(None).unwrap();
        assert!(!local.is_remote());
        assert_eq!(local.profile_name(), LOCAL_CONNECTION_NAME);
    }

    #[test]
    fn test_local_profile_entry() {
        let dir = TempDir::new().unwrap();
        let pool = pool(&dir, &Arc::new(FakeSpawner::new()));

        let laptop = pool.get(Some("laptop")).unwrap();
        assert!(!laptop.is_remote());
        assert_eq!(laptop.profile_name(), "laptop");
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_closes_everything() {
        let dir = TempDir::new().unwrap();
        let spawner = Arc::new(FakeSpawner::new());
        let pool = pool(&dir, &spawner);

        let a = pool.get(Some("a")).unwrap();
        a.ensure_connected().await.unwrap();
        let socket = a.socket_path().unwrap().to_path_buf();

        pool.clear();
        assert!(pool.is_empty());
        assert_eq!(a.status(), ConnectionStatus::Closed);
        assert!(!socket.exists());

        let fresh = pool.get(Some("a")).unwrap();
        assert!(!Arc::ptr_eq(&a, &fresh));
        fresh.ensure_connected().await.unwrap();
        assert_eq!(spawner.spawns(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_manager_is_replaced() {
        let dir = TempDir::new().unwrap();
        let pool = pool(&dir, &Arc::new(FakeSpawner::new()));

        let a = pool.get(Some("a")).unwrap();
        a.cleanup();
        let again = pool.get(Some("a")).unwrap();
        assert!(!Arc::ptr_eq(&a, &again));
        assert_eq!(again.status(), ConnectionStatus::Uninitialized);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_keeps_pooled_identity() {
        let dir = TempDir::new().unwrap();
        let spawner = Arc::new(FakeSpawner::new());
        let pool = pool(&dir, &spawner);

        let a = pool.get(Some("a")).unwrap();
        a.ensure_connected().await.unwrap();
        std::fs::remove_file(a.socket_path().unwrap()).unwrap();
        a.health_check().await.unwrap();

        let again = pool.get(Some("a")).unwrap();
        assert!(Arc::ptr_eq(&a, &again));
        assert_eq!(again.status(), ConnectionStatus::Connected);
        assert_eq!(spawner.spawns(), 2);
    }
}
