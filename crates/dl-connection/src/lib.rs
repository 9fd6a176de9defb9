//! dl-connection: Engine connections for dockline
//!
//! A [`ConnectionManager`] owns one SSH-forwarded Unix socket tunnel to a
//! remote engine (or points at the local engine), creates it lazily, keeps it
//! alive with a background health monitor and tears it down on request.
//! A [`ConnectionPool`] hands out one manager per profile name.
//!
//! The external `ssh` and `docker` executables are only reached through the
//! traits in [`dl_core::traits`], so everything here can be driven by fakes.

pub mod engine;
pub mod health;
pub mod manager;
pub mod pool;
pub mod runner;
pub mod socket;
pub mod spawner;
pub mod ssh;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{UnixEngineClient, UnixEngineConnector};
pub use health::{HealthHandle, HealthMonitor};
pub use manager::{ConnectionDeps, ConnectionInfo, ConnectionManager};
pub use pool::{ConnectionPool, PoolKey, LOCAL_CONNECTION_NAME};
pub use runner::{LocalCommandRunner, SshCommandRunner};
pub use socket::socket_path_for;
pub use spawner::SshForwardSpawner;
