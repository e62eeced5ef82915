//! The DHT record shape shared by every validator and the in-memory client.
//!
//! The transport that actually routes and replicates these records (Kademlia
//! over libp2p) is out of scope here — this crate only models what a record
//! looks like and the rules a `store`/`get` must pass before it is allowed.

use serde::{Deserialize, Serialize};

/// A record as seen by the validator chain, before it reaches (or after it
/// leaves) the black-box DHT transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DhtRecord {
    pub key: String,
    pub subkey: String,
    pub value: Vec<u8>,
    /// Unix seconds.
    pub expiration_time: f64,
}

impl DhtRecord {
    pub fn new(key: impl Into<String>, subkey: impl Into<String>, value: Vec<u8>, expiration_time: f64) -> Self {
        Self { key: key.into(), subkey: subkey.into(), value, expiration_time }
    }

    /// The canonical bytes signed/verified by the Signed Record Validator:
    /// `key || subkey || stripped_value || expiration_time`. All four
    /// fields are folded in so tampering with any one of them invalidates
    /// the signature.
    pub fn canonical_bytes(key: &str, subkey: &str, stripped_value: &[u8], expiration_time: f64) -> Vec<u8> {
        let mut buf = Vec::with_capacity(key.len() + subkey.len() + stripped_value.len() + 8);
        buf.extend_from_slice(key.as_bytes());
        buf.extend_from_slice(subkey.as_bytes());
        buf.extend_from_slice(stripped_value);
        buf.extend_from_slice(&expiration_time.to_be_bytes());
        buf
    }
}

/// The two operations every validator is asked to judge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhtOp {
    Get,
    Post,
}
