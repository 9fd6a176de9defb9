//! Local socket naming for forwarded tunnels

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use dl_core::config::ConnectionProfile;

/// Hex characters of the digest kept in the socket name
const DIGEST_CHARS: usize = 16;

/// Deterministic local socket path for a profile's tunnel
///
/// The name hashes the profile identity (name and username) together with the
/// network target, so the same profile always maps to the same socket across
/// process restarts while two profiles pointing at the same host never share
/// one. Hashing also keeps the path short enough for `sun_path`.
pub fn socket_path_for(dir: &Path, profile: &ConnectionProfile) -> PathBuf {
    let mut hasher = Sha256::new();
    for part in [
        profile.name.as_str(),
        profile.username.as_str(),
        profile.host.as_str(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(profile.port.to_be_bytes());

    let digest = format!("{:x}", hasher.finalize());
    dir.join(format!("dockline-{}.sock", &digest[..DIGEST_CHARS]))
}
