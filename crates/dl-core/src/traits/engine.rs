//! Container engine client traits

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::error::EngineError;

/// Minimal client for the container engine API
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// No-op call used as a liveness probe
    async fn ping(&self) -> Result<(), EngineError>;

    /// Issue a GET against the engine API and return the response body
    async fn get(&self, path: &str) -> Result<String, EngineError>;

    /// Socket this client is bound to
    fn endpoint(&self) -> &Path;
}

/// Builds engine clients bound to a socket path
pub trait EngineConnector: Send + Sync {
    /// Create a client for the engine listening on `endpoint`
    fn connect(&self, endpoint: &Path) -> Arc<dyn EngineClient>;
}
