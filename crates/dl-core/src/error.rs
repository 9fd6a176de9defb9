//! Core error types for dockline

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::retry::RetryError;

/// Top-level error type for the dockline ecosystem
#[derive(Error, Debug)]
pub enum DlError {
    /// Tunnel or engine connection error
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// A single attempt outlived its deadline
    #[error("Operation timed out after {after:?} (attempt {attempt})")]
    Timeout { after: Duration, attempt: u32 },

    /// Every permitted attempt failed
    #[error("Operation failed after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<DlError>,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Remote or local command error
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    /// Container engine API error
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl<E> From<RetryError<E>> for DlError
where
    E: std::error::Error + Into<DlError> + 'static,
{
    fn from(err: RetryError<E>) -> Self {
        match err {
            RetryError::Timeout { after, attempt } => DlError::Timeout { after, attempt },
            RetryError::Exhausted { attempts, last } => DlError::RetryExhausted {
                attempts,
                source: Box::new(last.into()),
            },
            RetryError::Aborted(e) => e.into(),
        }
    }
}

/// Tunnel and connection errors
///
/// Cloneable so that a single in-flight acquisition can hand the same
/// outcome to every caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The forwarding tunnel could not be established
    #[error("Tunnel to {target} failed: {reason}{}", format_output(.output))]
    TunnelFailed {
        target: String,
        reason: String,
        output: String,
    },

    /// Unix socket forwarding is unavailable on this platform
    #[error("Unsupported platform '{0}': tunnel forwarding requires Unix domain sockets")]
    UnsupportedPlatform(String),

    /// The forwarding process could not be started
    #[error("Failed to spawn forwarding process: {0}")]
    Spawn(String),

    /// A liveness probe against the engine failed
    #[error("Engine probe failed at {endpoint}: {reason}")]
    Probe { endpoint: String, reason: String },

    /// The connection was torn down and cannot be reused
    #[error("Connection '{0}' has been closed")]
    Closed(String),
}

fn format_output(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(" (process output: {})", trimmed)
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A profile was requested but nothing is configured
    #[error(
        "Profile '{profile}' requested but no profile configuration is available \
         ({hint}); no local fallback was attempted"
    )]
    NotConfigured { profile: String, hint: String },

    /// The requested profile is not in the configuration
    #[error(
        "Profile '{profile}' not found in {origin} (known profiles: {known}); \
         no local fallback was attempted"
    )]
    ProfileNotFound {
        profile: String,
        origin: String,
        known: String,
    },

    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Config file could not be read
    #[error("Failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON for the profile schema
    #[error("Invalid profile config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A profile is structurally incomplete
    #[error("Invalid profile '{profile}': {reason}")]
    InvalidProfile { profile: String, reason: String },

    /// An environment switch holds an unusable value
    #[error("Invalid value for {var}: {reason}")]
    InvalidEnv { var: String, reason: String },
}

/// Errors raised while running a command through a runner
#[derive(Error, Debug)]
pub enum CommandError {
    /// The program could not be started
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The command outlived the runner's own deadline
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    /// The secure shell itself failed (exit status 255)
    #[error("SSH connection to {target} failed: {stderr}")]
    Connection { target: String, stderr: String },

    /// I/O error while collecting output
    #[error("I/O error while running command: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors talking to the container engine API
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine socket refused or dropped the connection
    #[error("Engine socket {path} unreachable: {source}")]
    Unreachable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The engine answered with a non-success status
    #[error("Engine returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The engine answer could not be understood
    #[error("Malformed engine response: {0}")]
    Malformed(String),

    /// The engine socket transport is unavailable on this platform
    #[error("Engine socket transport unsupported on '{0}'")]
    Unsupported(String),
}
