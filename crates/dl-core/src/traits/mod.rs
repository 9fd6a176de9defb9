//! Core trait definitions
//!
//! External executables (the container engine CLI, the secure shell) and the
//! engine API are reached only through these traits so that connection and
//! discovery logic can be exercised without real processes.

mod command;
mod engine;
mod spawner;

pub use command::{CommandOptions, CommandOutput, RemoteCommandRunner};
pub use engine::{EngineClient, EngineConnector};
pub use spawner::{ForwardProcess, ForwardSpec, ProcessSpawner};
