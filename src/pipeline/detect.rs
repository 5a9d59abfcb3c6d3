//! Content fingerprinting.
//!
//! The link is not a stable identity: the same document can reappear under a
//! rotating filename, and a fixed URL can serve new content. Only a hash of
//! the full byte content decides whether something is new.

use crate::state::WatchState;
use sha2::{Digest, Sha256};

/// Lower-case hex SHA-256 of the whole document.
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// True unless `fingerprint` equals the last published one.
pub fn has_changed(fingerprint: &str, state: &WatchState) -> bool {
    fingerprint != state.last_fingerprint
}
