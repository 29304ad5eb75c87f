//! Request-addressed cache key generation.

use sha2::{Digest, Sha256};

/// Compute the cache key identifying a request.
///
/// The key is the SHA-256 of the uppercased method and the canonical URL,
/// so `GET /api/v1/videos?limit=12` and `GET /api/v1/videos?limit=24` are
/// distinct entries while header order and casing never matter.
pub fn entry_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}
