//! Domain entities shared across the DHT, RPC, and consensus layers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{BlockHeight, PeerId, SubnetNodeId};

/// On-chain node tier. Only `Validator`-class nodes may attest; `Included`
/// nodes participate in consensus data to graduate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Classification {
    Registered,
    Idle,
    Included,
    Validator,
}

/// Lifecycle state of the subnet itself, as reported on-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubnetState {
    Registered,
    Active,
    Paused,
}

/// Local node lifecycle, driven by the Module Lifecycle component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    Joining,
    Online,
    Offline,
}

/// Chain-formatted subnet info, as returned by `get_formatted_subnet_info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubnetChainInfo {
    pub state: SubnetState,
    pub slot_index: BlockHeight,
}

/// Read-only per-epoch snapshot of a registered subnet node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubnetNodeInfo {
    pub subnet_node_id: SubnetNodeId,
    pub peer_id: PeerId,
    pub hotkey: String,
    pub coldkey: String,
    pub classification: Classification,
    pub stake_balance: u128,
    pub penalties: u32,
}

/// An on-chain score entry, keyed by subnet node id (not peer id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetNodeConsensusData {
    pub subnet_node_id: SubnetNodeId,
    pub score: u128,
}

/// In-subnet helper score, keyed by peer id, before on-chain formatting.
/// `score` is fixed-point, `× 10^18` of the internal `[0,1]` float score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusScores {
    pub peer_id: PeerId,
    pub score: i128,
}

pub const SCORE_FIXED_POINT_SCALE: f64 = 1_000_000_000_000_000_000.0;

impl ConsensusScores {
    pub fn from_float(peer_id: PeerId, score: f64) -> Self {
        Self {
            peer_id,
            score: (score * SCORE_FIXED_POINT_SCALE) as i128,
        }
    }
}

/// A recorded attestation against a validator's proposed consensus data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestEntry {
    pub block: BlockHeight,
}

/// The elected validator's published proposal for an epoch. At most one per
/// `(subnet, epoch)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusData {
    pub validator_id: SubnetNodeId,
    pub attests: HashMap<SubnetNodeId, AttestEntry>,
    pub subnet_nodes: Vec<SubnetNodeInfo>,
    pub data: Vec<SubnetNodeConsensusData>,
}

/// A single verifier/prover round: the verifier poses `equation`, evaluates
/// it locally as `answer`, and records whether the prover's `peer_answer`
/// matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MathData {
    pub peer_id: PeerId,
    pub equation: String,
    pub answer: i64,
    pub peer_answer: i64,
    pub score: f64,
}

impl MathData {
    pub fn score_answer(peer_id: PeerId, equation: String, answer: i64, peer_answer: i64) -> Self {
        let score = if answer == peer_answer { 1.0 } else { 0.0 };
        Self { peer_id, equation, answer, peer_answer, score }
    }
}

/// A signed, short-lived identity token, re-issued roughly once per minute
/// by the Signature Authorizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessToken {
    pub username: String,
    pub public_key: Vec<u8>,
    /// RFC3339 UTC timestamp.
    pub expiration_time: String,
    pub signature: Vec<u8>,
}

impl AccessToken {
    /// The exact byte string signed over — matches the field order the
    /// token is verified against everywhere else in the stack.
    pub fn signing_payload(&self) -> Vec<u8> {
        format!("{} {} {}", self.username, hex::encode(&self.public_key), self.expiration_time).into_bytes()
    }
}

/// Envelope attached to every authenticated request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestAuthInfo {
    pub client_access_token: AccessToken,
    pub service_public_key: Option<Vec<u8>>,
    pub time: f64,
    pub nonce: [u8; 8],
    pub signature: Vec<u8>,
}

/// Envelope attached to every authenticated response; `nonce` must echo the
/// request's nonce so the client can bind the response to its request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseAuthInfo {
    pub service_access_token: AccessToken,
    pub nonce: [u8; 8],
    pub signature: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_orders_as_documented() {
        assert!(Classification::Registered < Classification::Idle);
        assert!(Classification::Idle < Classification::Included);
        assert!(Classification::Included < Classification::Validator);
    }

    #[test]
    fn consensus_scores_from_float_scales_to_fixed_point() {
        let scores = ConsensusScores::from_float(PeerId::new("peer-a"), 1.0);
        assert_eq!(scores.score, 1_000_000_000_000_000_000);
    }

    #[test]
    fn math_data_scores_exact_match_as_one() {
        let md = MathData::score_answer(PeerId::new("prover"), "3 + 4".into(), 7, 7);
        assert_eq!(md.score, 1.0);
        let mismatch = MathData::score_answer(PeerId::new("prover"), "3 + 4".into(), 7, 8);
        assert_eq!(mismatch.score, 0.0);
    }
}
