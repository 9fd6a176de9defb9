//! Discovery errors

use thiserror::Error;

use dl_core::DlError;

/// Errors raised while discovering workloads
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Connection, retry or command transport failure
    #[error(transparent)]
    Dl(#[from] DlError),

    /// The inspect command ran but reported failure
    #[error("'{command}' exited with status {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },
}
