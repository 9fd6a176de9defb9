//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a connection manager
///
/// `Closed` is terminal: once torn down, a manager never reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No connection has been attempted yet
    Uninitialized,
    /// A tunnel is being established
    Connecting,
    /// The connection is usable
    Connected,
    /// The last probe or acquisition failed; the next use reconnects
    Degraded,
    /// Torn down
    Closed,
}

impl ConnectionStatus {
    /// Whether calls can be issued without reconnecting first
    pub fn is_usable(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Uninitialized => write!(f, "uninitialized"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Degraded => write!(f, "degraded"),
            ConnectionStatus::Closed => write!(f, "closed"),
        }
    }
}
