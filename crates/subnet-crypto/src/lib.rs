//! Cryptographic primitives for the subnet node runtime.
//!
//! Identity keys are dual Ed25519/RSA (see [`keys`]); every hash used by the
//! commit-reveal engine and the DHT record validators is SHA-256 ([`hash`]).

pub mod error;
pub mod hash;
pub mod keys;

pub use error::{CryptoError, Result};
pub use hash::{commit_digest, sha256, Hash};
pub use keys::{load_public_key_from_bytes, KeyType, PrivateKey, PublicKey, DEFAULT_RSA_BITS};
