use serde::{Deserialize, Serialize};

/// 32-byte hash type, used for commit digests.
pub type Hash = [u8; 32];

pub type SubnetId = u32;
pub type SubnetNodeId = u32;
pub type BlockHeight = u64;
pub type EpochNumber = u64;

/// A peer's network identifier. Carried as an opaque string (hex encoding of
/// the peer's tagged public key) rather than re-deriving one from a public
/// key here — whoever owns the node's identity derives it once and passes
/// it down.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PeerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for PeerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Result of a blockchain state-changing call (`propose_attestation`, `attest`, …).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub success: bool,
    pub block_height: BlockHeight,
}
