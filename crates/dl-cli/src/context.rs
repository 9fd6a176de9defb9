//! Per-invocation state shared by the commands

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use dl_connection::{ConnectionManager, ConnectionPool};
use dl_core::config::{default_profiles_path, load_profiles, ProfileConfig};

/// Base directory assumed for projects when neither the command line nor
/// the profile names one
pub const DEFAULT_BASE_PATH: &str = "/srv";

/// Load profiles from an explicit file, the environment, or the default file
///
/// Returns `Ok(None)` when nothing is configured anywhere.
pub fn load_config(explicit: Option<&Path>) -> Result<Option<ProfileConfig>> {
    if let Some(path) = explicit {
        return load_profiles(path)
            .map(Some)
            .with_context(|| format!("Failed to load profiles from {:?}", path));
    }

    if let Some(config) = ProfileConfig::from_env().context("Invalid profile environment")? {
        return Ok(Some(config));
    }

    let fallback = default_profiles_path();
    if fallback.exists() {
        tracing::debug!("Using default profile file {:?}", fallback);
        return load_profiles(&fallback)
            .map(Some)
            .with_context(|| format!("Failed to load profiles from {:?}", fallback));
    }
    Ok(None)
}

/// Connection pool plus the caller's selection
pub struct CliContext {
    pub pool: ConnectionPool,
    /// Selected profile; `None` means the local engine
    pub profile: Option<String>,
    /// Emit JSON instead of tables
    pub json: bool,
}

impl CliContext {
    /// Build a context, selecting `explicit` or else the configured default
    pub fn new(pool: ConnectionPool, explicit: Option<String>, json: bool) -> Self {
        let profile = explicit.or_else(|| pool.default_profile().map(str::to_string));
        Self {
            pool,
            profile,
            json,
        }
    }

    /// Human-readable name of the selected target
    pub fn target_name(&self) -> &str {
        self.profile.as_deref().unwrap_or("local")
    }

    /// Manager for the selected profile
    pub fn connection(&self) -> Result<Arc<ConnectionManager>> {
        self.pool
            .get(self.profile.as_deref())
            .with_context(|| format!("Cannot use profile '{}'", self.target_name()))
    }

    /// Project base path: explicit, else the profile's, else the default
    pub fn base_path(&self, explicit: Option<&str>) -> String {
        if let Some(path) = explicit {
            return path.to_string();
        }
        self.profile
            .as_deref()
            .and_then(|name| self.pool.config()?.resolve(name).ok())
            .and_then(|profile| profile.projects_path().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_BASE_PATH.to_string())
    }
}
