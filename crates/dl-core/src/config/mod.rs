//! Configuration management for dockline
//!
//! Profiles come from a JSON file named by `DOCKLINE_PROFILES`, or from a
//! single ad-hoc remote target described by the `DOCKLINE_SSH_*` variables.
//! Having neither is valid: only local operation is available then.

mod profile;
pub mod serde_utils;
mod settings;

pub use profile::{
    ConnectionProfile, Profile, ProfileEntry, ProfileMode, SshAuth, DEFAULT_SSH_PORT,
};
pub use settings::{ConnectionSettings, RetryPolicy, DEFAULT_REMOTE_ENGINE_SOCKET};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Variable naming the profile file
pub const PROFILES_ENV: &str = "DOCKLINE_PROFILES";
/// Ad-hoc remote host
pub const SSH_HOST_ENV: &str = "DOCKLINE_SSH_HOST";
/// Ad-hoc remote user (defaults to the current user)
pub const SSH_USER_ENV: &str = "DOCKLINE_SSH_USER";
/// Ad-hoc remote port
pub const SSH_PORT_ENV: &str = "DOCKLINE_SSH_PORT";
/// Ad-hoc identity file
pub const SSH_KEY_ENV: &str = "DOCKLINE_SSH_KEY";

/// Name given to the profile built from the `DOCKLINE_SSH_*` variables
pub const ADHOC_PROFILE_NAME: &str = "default";

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dockline")
}

/// Get the default profile file path
pub fn default_profiles_path() -> PathBuf {
    default_config_dir().join("profiles.json")
}

/// On-disk shape of the profile file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilesFile {
    /// Profile used when the caller does not name one
    #[serde(default)]
    pub default: Option<String>,

    /// Profiles by name
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileEntry>,

    /// Optional connection tuning
    #[serde(default)]
    pub settings: ConnectionSettings,
}

/// Where a profile configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileSource {
    /// A JSON profile file
    File(PathBuf),
    /// The `DOCKLINE_SSH_*` variables
    Environment,
}

impl fmt::Display for ProfileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileSource::File(path) => write!(f, "profile file {}", path.display()),
            ProfileSource::Environment => write!(f, "{} environment variables", SSH_HOST_ENV),
        }
    }
}

/// Loaded profile configuration
#[derive(Debug, Clone)]
pub struct ProfileConfig {
    source: ProfileSource,
    file: ProfilesFile,
}

impl ProfileConfig {
    /// Build a configuration from an already parsed file
    pub fn new(source: ProfileSource, file: ProfilesFile) -> Self {
        Self { source, file }
    }

    /// Where this configuration came from
    pub fn source(&self) -> &ProfileSource {
        &self.source
    }

    /// Name of the default profile, if any
    pub fn default_profile(&self) -> Option<&str> {
        self.file.default.as_deref()
    }

    /// Connection tuning carried by the file
    pub fn settings(&self) -> &ConnectionSettings {
        &self.file.settings
    }

    /// All profile names, sorted
    pub fn names(&self) -> Vec<String> {
        self.file.profiles.keys().cloned().collect()
    }

    /// Resolve and validate a named profile
    ///
    /// An unknown name is an error; there is no fallback to local.
    pub fn resolve(&self, name: &str) -> Result<Profile, ConfigError> {
        let entry = self
            .file
            .profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound {
                profile: name.to_string(),
                origin: self.source.to_string(),
                known: if self.file.profiles.is_empty() {
                    "none".to_string()
                } else {
                    self.names().join(", ")
                },
            })?;
        entry.resolve(name)
    }

    /// Load configuration from the process environment
    ///
    /// Returns `Ok(None)` when neither the profile file variable nor the
    /// ad-hoc host variable is set.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration using an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(path) = non_empty(PROFILES_ENV) {
            return load_profiles(Path::new(&path)).map(Some);
        }

        let Some(host) = non_empty(SSH_HOST_ENV) else {
            return Ok(None);
        };

        let port = match non_empty(SSH_PORT_ENV) {
            Some(raw) => Some(raw.trim().parse::<u16>().map_err(|e| ConfigError::InvalidEnv {
                var: SSH_PORT_ENV.to_string(),
                reason: format!("'{}' is not a port: {}", raw, e),
            })?),
            None => None,
        };

        let entry = ProfileEntry {
            mode: ProfileMode::Remote,
            host: Some(host),
            username: Some(non_empty(SSH_USER_ENV).unwrap_or_else(whoami::username)),
            port,
            private_key_path: non_empty(SSH_KEY_ENV).map(PathBuf::from),
            ..Default::default()
        };
        // Validate eagerly so a bad variable surfaces at startup
        entry.resolve(ADHOC_PROFILE_NAME)?;

        let mut profiles = BTreeMap::new();
        profiles.insert(ADHOC_PROFILE_NAME.to_string(), entry);

        tracing::debug!("Using ad-hoc profile from {}", SSH_HOST_ENV);
        Ok(Some(Self::new(
            ProfileSource::Environment,
            ProfilesFile {
                default: Some(ADHOC_PROFILE_NAME.to_string()),
                profiles,
                settings: ConnectionSettings::default(),
            },
        )))
    }
}

/// Load a profile file
///
/// A missing or malformed file is an error.
pub fn load_profiles(path: &Path) -> Result<ProfileConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let file: ProfilesFile =
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    if let Some(default) = &file.default {
        if !file.profiles.contains_key(default) {
            return Err(ConfigError::InvalidProfile {
                profile: default.clone(),
                reason: format!("named as default in {} but not defined", path.display()),
            });
        }
    }

    tracing::debug!("Loaded {} profiles from {:?}", file.profiles.len(), path);
    Ok(ProfileConfig::new(ProfileSource::File(path.to_path_buf()), file))
}

/// Explain where a profile could have come from, for error messages
pub fn configuration_hint() -> String {
    format!(
        "set {} to a profile file, or {} (with optional {}, {}, {}) for an ad-hoc target",
        PROFILES_ENV, SSH_HOST_ENV, SSH_USER_ENV, SSH_PORT_ENV, SSH_KEY_ENV
    )
}
