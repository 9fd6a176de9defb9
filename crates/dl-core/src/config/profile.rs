//! Connection profile configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::ConfigError;

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Whether a profile talks to the local engine or tunnels to a remote one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileMode {
    Local,
    #[default]
    Remote,
}

/// A profile entry exactly as written in the profile file
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileEntry {
    #[serde(default)]
    pub mode: ProfileMode,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub passphrase: Option<String>,
    #[serde(default)]
    pub projects_path: Option<String>,
}

impl fmt::Debug for ProfileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileEntry")
            .field("mode", &self.mode)
            .field("host", &self.host)
            .field("username", &self.username)
            .field("port", &self.port)
            .field("private_key_path", &self.private_key_path)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("projects_path", &self.projects_path)
            .finish()
    }
}

/// How the secure shell authenticates
#[derive(Clone, PartialEq, Eq)]
pub enum SshAuth {
    /// Identity file, optionally protected by a passphrase
    Key {
        path: PathBuf,
        passphrase: Option<String>,
    },
    /// Password authentication
    Password(String),
    /// Whatever the running ssh-agent offers
    Agent,
}

impl SshAuth {
    /// Short label for logs and tables
    pub fn kind(&self) -> &'static str {
        match self {
            SshAuth::Key { passphrase: None, .. } => "key",
            SshAuth::Key { .. } => "key+passphrase",
            SshAuth::Password(_) => "password",
            SshAuth::Agent => "agent",
        }
    }
}

impl fmt::Debug for SshAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SshAuth::Key { path, passphrase } => f
                .debug_struct("Key")
                .field("path", path)
                .field("passphrase", &passphrase.as_ref().map(|_| "<redacted>"))
                .finish(),
            SshAuth::Password(_) => f.write_str("Password(<redacted>)"),
            SshAuth::Agent => f.write_str("Agent"),
        }
    }
}

/// A validated remote profile: identity plus network target
///
/// Immutable once loaded. Two profiles may share `host`/`port` and still be
/// distinct identities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: SshAuth,
    pub projects_path: Option<String>,
}

impl ConnectionProfile {
    /// `user@host:port`, used in logs and error messages
    pub fn target(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}

/// A resolved profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Profile {
    /// Talks to the engine on this machine
    Local {
        name: String,
        projects_path: Option<String>,
    },
    /// Tunnels to an engine on another machine
    Remote(ConnectionProfile),
}

impl Profile {
    /// Profile name
    pub fn name(&self) -> &str {
        match self {
            Profile::Local { name, .. } => name,
            Profile::Remote(profile) => &profile.name,
        }
    }

    /// Base directory holding composition projects, if configured
    pub fn projects_path(&self) -> Option<&str> {
        match self {
            Profile::Local { projects_path, .. } => projects_path.as_deref(),
            Profile::Remote(profile) => profile.projects_path.as_deref(),
        }
    }

    /// Whether this profile needs a tunnel
    pub fn is_remote(&self) -> bool {
        matches!(self, Profile::Remote(_))
    }
}

impl ProfileEntry {
    /// Validate the entry and turn it into a resolved profile
    pub fn resolve(&self, name: &str) -> Result<Profile, ConfigError> {
        if self.mode == ProfileMode::Local {
            return Ok(Profile::Local {
                name: name.to_string(),
                projects_path: self.projects_path.clone(),
            });
        }

        let invalid = |reason: &str| ConfigError::InvalidProfile {
            profile: name.to_string(),
            reason: reason.to_string(),
        };

        let host = self
            .host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("remote profile requires 'host'"))?;
        let username = self
            .username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| invalid("remote profile requires 'username'"))?;

        let auth = match (&self.private_key_path, &self.password, &self.passphrase) {
            (Some(path), None, passphrase) => SshAuth::Key {
                path: path.clone(),
                passphrase: passphrase.clone(),
            },
            (None, Some(password), None) => SshAuth::Password(password.clone()),
            (None, None, None) => SshAuth::Agent,
            (None, None, Some(_)) => {
                return Err(invalid("'passphrase' requires 'privateKeyPath'"));
            }
            (Some(_), Some(_), _) | (None, Some(_), Some(_)) => {
                return Err(invalid(
                    "specify only one of 'privateKeyPath'/'passphrase' or 'password'",
                ));
            }
        };

        Ok(Profile::Remote(ConnectionProfile {
            name: name.to_string(),
            host: host.to_string(),
            port: self.port.unwrap_or(DEFAULT_SSH_PORT),
            username: username.to_string(),
            auth,
            projects_path: self.projects_path.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_entry() -> ProfileEntry {
        ProfileEntry {
            host: Some("docker.example.com".to_string()),
            username: Some("deploy".to_string()),
            private_key_path: Some(PathBuf::from("/keys/id_ed25519")),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_remote_with_key() {
        let profile = remote_entry().resolve("prod").unwrap();
        let Profile::Remote(p) = profile else {
            panic!("expected remote profile");
        };
        assert_eq!(p.port, 22);
        assert_eq!(p.target(), "deploy@docker.example.com:22");
        assert_eq!(p.auth.kind(), "key");
    }

    #[test]
    fn test_resolve_local_ignores_network_fields() {
        let entry = ProfileEntry {
            mode: ProfileMode::Local,
            ..Default::default()
        };
        let profile = entry.resolve("laptop").unwrap();
        assert!(!profile.is_remote());
        assert_eq!(profile.name(), "laptop");
    }

    #[test]
    fn test_resolve_requires_host() {
        let entry = ProfileEntry {
            username: Some("deploy".to_string()),
            ..Default::default()
        };
        let err = entry.resolve("broken").unwrap_err();
        assert!(err.to_string().contains("host"));
    }

    #[test]
    fn test_resolve_password_and_agent() {
        let mut entry = remote_entry();
        entry.private_key_path = None;
        entry.password = Some("hunter2".to_string());
        let Profile::Remote(p) = entry.resolve("pw").unwrap() else {
            panic!("expected remote profile");
        };
        assert_eq!(p.auth, SshAuth::Password("hunter2".to_string()));

        entry.password = None;
        let Profile::Remote(p) = entry.resolve("agent").unwrap() else {
            panic!("expected remote profile");
        };
        assert_eq!(p.auth, SshAuth::Agent);
    }

    #[test]
    fn test_resolve_rejects_conflicting_credentials() {
        let mut entry = remote_entry();
        entry.password = Some("hunter2".to_string());
        assert!(entry.resolve("both").is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut entry = remote_entry();
        entry.passphrase = Some("very-secret".to_string());
        let rendered = format!("{:?}", entry);
        assert!(!rendered.contains("very-secret"));

        let auth = SshAuth::Password("hunter2".to_string());
        assert!(!format!("{:?}", auth).contains("hunter2"));
    }
}
