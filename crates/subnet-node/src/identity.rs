//! Node identity: load-or-generate the long-lived private key backing this
//! node's signatures, and derive its [`PeerId`] from the matching public key.

use std::path::Path;

use anyhow::{bail, Context, Result};
use subnet_core::types::PeerId;
use subnet_crypto::{KeyType, PrivateKey, DEFAULT_RSA_BITS};
use tracing::info;

/// Loads the identity key at `path`, generating and persisting a fresh one
/// of the given `key_type` ("ed25519" or "rsa") if the file does not exist.
pub fn load_or_generate(path: &Path, key_type: &str) -> Result<PrivateKey> {
    if path.exists() {
        let bytes = std::fs::read(path).with_context(|| format!("reading identity key at {path:?}"))?;
        let key = PrivateKey::from_bytes(&bytes).context("decoding identity key")?;
        info!(path = ?path, "loaded existing identity key");
        return Ok(key);
    }

    let key = match key_type.to_ascii_lowercase().as_str() {
        "ed25519" => PrivateKey::generate_ed25519(),
        "rsa" => PrivateKey::generate_rsa(DEFAULT_RSA_BITS)?,
        other => bail!("unsupported key type: {other}"),
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, key.to_bytes()?).with_context(|| format!("writing identity key to {path:?}"))?;
    info!(path = ?path, key_type = ?key.key_type(), "generated new identity key");
    Ok(key)
}

/// Derives this node's [`PeerId`] from its public key: the hex-tagged bytes
/// hex-encoded, used as the stable text form everywhere a `PeerId` is
/// expected (DHT subkeys, heartbeat payloads, peer address books).
pub fn derive_peer_id(public_key_bytes: &[u8]) -> PeerId {
    PeerId::new(hex::encode(public_key_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_and_persists_a_fresh_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.key");
        assert!(!path.exists());

        let key = load_or_generate(&path, "ed25519").unwrap();
        assert!(path.exists());
        assert_eq!(key.key_type(), KeyType::Ed25519);
    }

    #[test]
    fn reloads_the_same_key_on_second_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.key");

        let first = load_or_generate(&path, "ed25519").unwrap();
        let second = load_or_generate(&path, "ed25519").unwrap();
        assert_eq!(first.get_public_key(), second.get_public_key());
    }

    #[test]
    fn rejects_unknown_key_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.key");
        assert!(load_or_generate(&path, "secp256k1").is_err());
    }

    #[test]
    fn peer_id_is_deterministic_for_the_same_public_key() {
        let key = PrivateKey::generate_ed25519();
        let bytes = key.get_public_key().to_bytes();
        assert_eq!(derive_peer_id(&bytes), derive_peer_id(&bytes));
    }
}
