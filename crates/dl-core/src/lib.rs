//! dl-core: Core abstractions and configuration for dockline
//!
//! This crate provides the error taxonomy, profile configuration, collaborator
//! traits, the retry/timeout executor and the single-flight primitive shared
//! by the connection, discovery and CLI crates.

pub mod config;
pub mod error;
pub mod process;
pub mod retry;
pub mod shell;
pub mod sync;
pub mod traits;
pub mod types;

pub use error::{CommandError, ConfigError, ConnectionError, DlError, EngineError};
pub use retry::{Attempted, RetryError, RetryExecutor};
pub use sync::SingleFlight;
pub use types::ConnectionStatus;
