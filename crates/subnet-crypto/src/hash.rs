use sha2::{Digest, Sha256};

pub type Hash = [u8; 32];

/// SHA-256 hash function. Used for commit-reveal digests throughout the
/// consensus engine — `digest = sha256(salt ‖ payload)`.
pub fn sha256(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Convenience for the two-piece commit digest `sha256(salt ‖ payload)`.
pub fn commit_digest(salt: &[u8], payload: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(payload);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}
