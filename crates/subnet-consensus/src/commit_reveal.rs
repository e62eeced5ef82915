//! Task Commit-Reveal Engine (§4.6): the four-phase per-epoch scheduler
//! that commits task digests, reveals task payloads, reveals score commits
//! from two epochs earlier, and commits the current epoch's final scores.
//!
//! Phases are strictly monotone within an epoch — if a phase's window
//! elapses before the engine gets to it, the phase is skipped outright;
//! there is no retry inside an epoch (§5).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use subnet_chain::ChainClient;
use subnet_core::dht_keys::{scores_commit_key, scores_reveal_key, verifier_commit_key, verifier_reveal_key};
use subnet_core::domain::{ConsensusScores, MathData, SubnetNodeConsensusData};
use subnet_core::subnet_constants::{
    max_commit_time_secs, max_reveal_time_secs, EXPIRATION_SAFETY_MARGIN, MIN_ATTESTATION_RATIO,
    SCORES_REVEAL_DEADLINE, VERIFIER_COMMIT_DEADLINE, VERIFIER_REVEAL_DEADLINE,
};
use subnet_core::types::{EpochNumber, PeerId, SubnetId};
use subnet_crypto::hash::commit_digest;
use subnet_crypto::PrivateKey;
use subnet_dht::client::DhtClient;

use crate::error::{ConsensusError, Result};
use crate::scoring::{
    average_consensus_scores, compare_consensus_data, normalize_validator_scores, peer_means, to_fixed_point,
    validator_errors,
};

#[derive(Debug, Clone, Copy)]
pub struct CommitRevealConfig {
    pub commit_deadline: f64,
    pub reveal_deadline: f64,
    pub scores_reveal_deadline: f64,
}

impl Default for CommitRevealConfig {
    fn default() -> Self {
        Self {
            commit_deadline: VERIFIER_COMMIT_DEADLINE,
            reveal_deadline: VERIFIER_REVEAL_DEADLINE,
            scores_reveal_deadline: SCORES_REVEAL_DEADLINE,
        }
    }
}

impl CommitRevealConfig {
    /// Asserts `commit_deadline < reveal_deadline <= scores_reveal_deadline`
    /// so no phase window collapses to zero width (§9 open question).
    pub fn validate(&self) -> Result<()> {
        if !(self.commit_deadline < self.reveal_deadline) {
            return Err(ConsensusError::FatalConfig(format!(
                "commit deadline {} must be < reveal deadline {}",
                self.commit_deadline, self.reveal_deadline
            )));
        }
        if !(self.reveal_deadline <= self.scores_reveal_deadline) {
            return Err(ConsensusError::FatalConfig(format!(
                "reveal deadline {} must be <= scores reveal deadline {}",
                self.reveal_deadline, self.scores_reveal_deadline
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RevealPayload {
    salt: [u8; 32],
    bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
struct TaskCommitState {
    epoch: EpochNumber,
    salt: [u8; 32],
    math_data: Vec<MathData>,
}

#[derive(Debug, Clone)]
struct ScoreCommitState {
    salt: [u8; 32],
    scores: Vec<SubnetNodeConsensusData>,
}

fn generate_salt() -> [u8; 32] {
    use rand::RngCore;
    let mut salt = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

fn unix_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Owns `latest_task_commit` and `latest_scores_commit`, mutated only by
/// the consensus loop thread that drives this engine (§3 Ownership).
pub struct CommitRevealEngine {
    identity: PrivateKey,
    dht: Arc<dyn DhtClient>,
    config: CommitRevealConfig,
    latest_task_commit: Mutex<Option<TaskCommitState>>,
    latest_scores_commit: Mutex<HashMap<EpochNumber, ScoreCommitState>>,
}

impl CommitRevealEngine {
    pub fn new(identity: PrivateKey, dht: Arc<dyn DhtClient>, config: CommitRevealConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            identity,
            dht,
            config,
            latest_task_commit: Mutex::new(None),
            latest_scores_commit: Mutex::new(HashMap::new()),
        })
    }

    fn public_key_bytes(&self) -> Vec<u8> {
        self.identity.get_public_key().to_bytes()
    }

    fn subkey(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    pub fn config(&self) -> &CommitRevealConfig {
        &self.config
    }

    /// Epoch the task-commit phase last committed a digest for, if any.
    /// Used by graceful shutdown to checkpoint in-flight state.
    pub fn latest_task_commit_epoch(&self) -> Option<EpochNumber> {
        self.latest_task_commit.lock().as_ref().map(|s| s.epoch)
    }

    /// Epochs the scores-commit phase still holds an uncommitted salt for.
    pub fn latest_scores_commit_epochs(&self) -> Vec<EpochNumber> {
        self.latest_scores_commit.lock().keys().copied().collect()
    }

    /// Phase 1 (`percent_complete <= commit_deadline`): digest and store
    /// this epoch's task set, remembering the payload locally for the
    /// reveal phase.
    pub async fn task_commit(&self, epoch: EpochNumber, percent_complete: f64, math_data: Vec<MathData>) -> bool {
        if percent_complete > self.config.commit_deadline {
            return false;
        }
        let salt = generate_salt();
        let payload = match serde_json::to_vec(&math_data) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        let digest = commit_digest(&salt, &payload);

        let expiration = unix_now() + max_commit_time_secs() * EXPIRATION_SAFETY_MARGIN;
        let stored = self
            .dht
            .store(&verifier_commit_key(epoch), &self.subkey(), digest.to_vec(), expiration, self.public_key_bytes())
            .await;
        if stored {
            *self.latest_task_commit.lock() = Some(TaskCommitState { epoch, salt, math_data });
        }
        stored
    }

    /// Phase 2 (`commit_deadline < percent_complete <= reveal_deadline`):
    /// reveal the salt and payload committed this same epoch.
    pub async fn task_reveal(&self, epoch: EpochNumber, percent_complete: f64) -> bool {
        if percent_complete <= self.config.commit_deadline || percent_complete > self.config.reveal_deadline {
            return false;
        }
        let state = {
            let guard = self.latest_task_commit.lock();
            match guard.as_ref() {
                Some(s) if s.epoch == epoch => s.clone(),
                _ => return false,
            }
        };
        let bytes = match serde_json::to_vec(&state.math_data) {
            Ok(b) => b,
            Err(_) => return false,
        };
        let value = match serde_json::to_vec(&RevealPayload { salt: state.salt, bytes }) {
            Ok(v) => v,
            Err(_) => return false,
        };
        let expiration = unix_now() + max_reveal_time_secs() * EXPIRATION_SAFETY_MARGIN;
        self.dht.store(&verifier_reveal_key(epoch), &self.subkey(), value, expiration, self.public_key_bytes()).await
    }

    /// Phase 4 (`percent_complete > scores_reveal_deadline`): hash and
    /// commit the current epoch's final scores.
    pub async fn score_commit(
        &self,
        epoch: EpochNumber,
        percent_complete: f64,
        scores: Vec<SubnetNodeConsensusData>,
    ) -> bool {
        if percent_complete <= self.config.scores_reveal_deadline {
            return false;
        }
        let salt = generate_salt();
        let payload = match serde_json::to_vec(&scores) {
            Ok(b) => b,
            Err(_) => return false,
        };
        let digest = commit_digest(&salt, &payload);
        let expiration = unix_now() + max_commit_time_secs() * EXPIRATION_SAFETY_MARGIN;
        let stored = self
            .dht
            .store(&scores_commit_key(epoch), &self.subkey(), digest.to_vec(), expiration, self.public_key_bytes())
            .await;
        if stored {
            self.latest_scores_commit.lock().insert(epoch, ScoreCommitState { salt, scores });
        }
        stored
    }

    /// Phase 3 (`commit_deadline < percent_complete <= scores_reveal_deadline`):
    /// reveal the score-commit created two epochs earlier.
    pub async fn score_reveal(&self, epoch: EpochNumber, percent_complete: f64) -> bool {
        if percent_complete <= self.config.commit_deadline || percent_complete > self.config.scores_reveal_deadline {
            return false;
        }
        let commit_epoch = match epoch.checked_sub(2) {
            Some(e) => e,
            None => return false,
        };
        let state = {
            let guard = self.latest_scores_commit.lock();
            match guard.get(&commit_epoch) {
                Some(s) => s.clone(),
                None => return false,
            }
        };
        let bytes = match serde_json::to_vec(&state.scores) {
            Ok(b) => b,
            Err(_) => return false,
        };
        let value = match serde_json::to_vec(&RevealPayload { salt: state.salt, bytes }) {
            Ok(v) => v,
            Err(_) => return false,
        };
        let expiration = unix_now() + max_reveal_time_secs() * EXPIRATION_SAFETY_MARGIN;
        self.dht.store(&scores_reveal_key(epoch), &self.subkey(), value, expiration, self.public_key_bytes()).await
    }

    /// Fetch and verify every verifier's task-reveal for `epoch` against
    /// its task-commit digest; mismatches are silently discarded (§8,
    /// testable property 7).
    async fn collect_verified_reveals(&self, epoch: EpochNumber) -> HashMap<PeerId, Vec<MathData>> {
        let mut out = HashMap::new();
        let commits = match self.dht.get(&verifier_commit_key(epoch), false).await {
            Some(c) => c,
            None => return out,
        };
        let reveals = match self.dht.get(&verifier_reveal_key(epoch), false).await {
            Some(r) => r,
            None => return out,
        };

        for (pubkey, entry) in reveals.value {
            let commit_entry = match commits.value.get(&pubkey) {
                Some(c) => c,
                None => continue,
            };
            let payload: RevealPayload = match serde_json::from_slice(&entry.value) {
                Ok(p) => p,
                Err(_) => continue,
            };
            let digest = commit_digest(&payload.salt, &payload.bytes);
            if digest.as_slice() != commit_entry.value.as_slice() {
                continue;
            }
            let math_data: Vec<MathData> = match serde_json::from_slice(&payload.bytes) {
                Ok(m) => m,
                Err(_) => continue,
            };
            out.insert(PeerId::new(hex::encode(&pubkey)), math_data);
        }
        out
    }

    /// Reveal-scored stream from `epoch - 2`: requires a current-epoch
    /// on-chain attestation ratio ≥ `MIN_ATTESTATION_RATIO`, counts only
    /// attesting nodes' reveals, and accepts a reveal only if its digest
    /// verifies and its revealed list matches the official `epoch - 2`
    /// data exactly (Jaccard == 1.0) — a partial or mismatched reveal is
    /// treated the same as a dishonest one and discarded.
    async fn collect_score_reveals(
        &self,
        epoch: EpochNumber,
        subnet_id: SubnetId,
        chain: &dyn ChainClient,
        peer_to_subnet_node_id: &HashMap<PeerId, u32>,
    ) -> Result<Option<HashMap<u32, i128>>> {
        let commit_epoch = match epoch.checked_sub(2) {
            Some(e) => e,
            None => return Ok(None),
        };

        let current_consensus = match chain.get_consensus_data_formatted(subnet_id, epoch).await? {
            Some(c) => c,
            None => return Ok(None),
        };
        let included_nodes = chain.get_min_class_subnet_nodes_formatted(
            subnet_id,
            epoch,
            subnet_core::domain::Classification::Included,
        )
        .await?;
        if included_nodes.is_empty() {
            return Ok(None);
        }
        let ratio = current_consensus.attests.len() as f64 / included_nodes.len() as f64;
        if ratio < MIN_ATTESTATION_RATIO {
            return Ok(None);
        }

        let historical_consensus = match chain.get_consensus_data_formatted(subnet_id, commit_epoch).await? {
            Some(c) => c,
            None => return Ok(None),
        };

        let commits = self.dht.get(&scores_commit_key(commit_epoch), false).await;
        let reveals = self.dht.get(&scores_reveal_key(epoch), false).await;
        let (Some(commits), Some(reveals)) = (commits, reveals) else { return Ok(None) };

        let attesting_ids: HashSet<u32> = current_consensus.attests.keys().copied().collect();

        for (pubkey, entry) in reveals.value {
            let peer = PeerId::new(hex::encode(&pubkey));
            match peer_to_subnet_node_id.get(&peer) {
                Some(id) if attesting_ids.contains(id) => {}
                _ => continue,
            };
            let commit_entry = match commits.value.get(&pubkey) {
                Some(c) => c,
                None => continue,
            };
            let payload: RevealPayload = match serde_json::from_slice(&entry.value) {
                Ok(p) => p,
                Err(_) => continue,
            };
            let digest = commit_digest(&payload.salt, &payload.bytes);
            if digest.as_slice() != commit_entry.value.as_slice() {
                continue;
            }
            let revealed: Vec<SubnetNodeConsensusData> = match serde_json::from_slice(&payload.bytes) {
                Ok(r) => r,
                Err(_) => continue,
            };
            if compare_consensus_data(&revealed, &historical_consensus.data) == 1.0 {
                let stream: HashMap<u32, i128> =
                    historical_consensus.data.iter().map(|d| (d.subnet_node_id, d.score as i128)).collect();
                return Ok(Some(stream));
            }
        }
        Ok(None)
    }

    /// The verify-and-score pass (`percent_complete > scores_reveal_deadline`):
    /// aggregate this epoch's math-scored verifiers with any matching
    /// `epoch - 2` score reveals, filtered to `Included`-or-higher nodes.
    pub async fn verify_and_score(
        &self,
        epoch: EpochNumber,
        subnet_id: SubnetId,
        chain: &dyn ChainClient,
        peer_to_subnet_node_id: &HashMap<PeerId, u32>,
    ) -> Result<(Vec<ConsensusScores>, Vec<SubnetNodeConsensusData>)> {
        let rounds_by_verifier = self.collect_verified_reveals(epoch).await;
        let means = peer_means(&rounds_by_verifier);
        let errors = validator_errors(&rounds_by_verifier, &means);
        let validator_scores = normalize_validator_scores(&errors);

        let mut math_stream = HashMap::new();
        for (peer, score) in &validator_scores {
            if let Some(&id) = peer_to_subnet_node_id.get(peer) {
                math_stream.insert(id, to_fixed_point(*score));
            }
        }

        let mut streams = vec![math_stream];
        if let Some(reveal_stream) = self.collect_score_reveals(epoch, subnet_id, chain, peer_to_subnet_node_id).await? {
            streams.push(reveal_stream);
        }

        let included_nodes = chain
            .get_min_class_subnet_nodes_formatted(subnet_id, epoch, subnet_core::domain::Classification::Included)
            .await?;
        let included_ids: HashSet<u32> = included_nodes.iter().map(|n| n.subnet_node_id).collect();

        let averaged = average_consensus_scores(&streams);
        let on_chain: Vec<SubnetNodeConsensusData> = averaged
            .iter()
            .filter(|(id, _)| included_ids.contains(id))
            .map(|(&subnet_node_id, &score)| SubnetNodeConsensusData { subnet_node_id, score: score.max(0) as u128 })
            .collect();
        let consensus_scores: Vec<ConsensusScores> =
            validator_scores.iter().map(|(peer, score)| ConsensusScores::from_float(peer.clone(), *score)).collect();

        Ok((consensus_scores, on_chain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subnet_core::epoch::{EpochClock, EpochData};
    use subnet_dht::client::InMemoryDht;
    use subnet_dht::predicate_validator::PredicateValidator;
    use subnet_dht::signed_validator::SignedRecordValidator;
    use subnet_dht::validator::{RecordValidator, ValidatorChain};

    struct FixedClock(EpochData);
    impl EpochClock for FixedClock {
        fn current(&self) -> EpochData {
            self.0
        }
    }

    fn epoch_at(epoch: u64, percent: f64) -> EpochData {
        EpochData {
            block: epoch * 100,
            epoch,
            block_per_epoch: 100,
            seconds_per_epoch: 300,
            percent_complete: percent,
            blocks_elapsed: (percent * 100.0) as u64,
            blocks_remaining: 100 - (percent * 100.0) as u64,
            seconds_elapsed: 0,
            seconds_remaining: 0,
        }
    }

    fn dht_for(epoch: u64, percent: f64) -> Arc<dyn DhtClient> {
        let mut chain = ValidatorChain::new();
        chain.register(RecordValidator::Signed(SignedRecordValidator::new()));
        chain.register(RecordValidator::Predicate(Arc::new(PredicateValidator::new())));
        Arc::new(InMemoryDht::new(chain, Arc::new(FixedClock(epoch_at(epoch, percent)))))
    }

    fn engine(epoch: u64, percent: f64) -> CommitRevealEngine {
        let dht = dht_for(epoch, percent);
        CommitRevealEngine::new(PrivateKey::generate_ed25519(), dht, CommitRevealConfig::default()).unwrap()
    }

    #[test]
    fn config_rejects_collapsed_windows() {
        let bad = CommitRevealConfig { commit_deadline: 0.6, reveal_deadline: 0.6, scores_reveal_deadline: 0.6 };
        assert!(bad.validate().is_err());
    }

    #[tokio::test]
    async fn task_commit_rejected_outside_window() {
        let e = engine(1, 0.9);
        let math = vec![MathData::score_answer(PeerId::new("prover"), "3 + 4".into(), 7, 7)];
        assert!(!e.task_commit(1, 0.9, math).await);
    }

    #[tokio::test]
    async fn commit_then_reveal_round_trip_verifies() {
        let dht = dht_for(1, 0.3);
        let engine = CommitRevealEngine::new(PrivateKey::generate_ed25519(), dht.clone(), CommitRevealConfig::default()).unwrap();
        let math = vec![MathData::score_answer(PeerId::new("prover"), "3 + 4".into(), 7, 7)];
        assert!(engine.task_commit(1, 0.3, math.clone()).await);

        // Advance the clock by driving a fresh in-memory dht at the reveal phase sharing state is
        // not possible here since InMemoryDht is keyed to one clock; this test only exercises the
        // local bookkeeping path via a second engine pointed at the same dht would need a shared
        // clock. Instead verify the committed state was retained.
        let guard = engine.latest_task_commit.lock();
        assert_eq!(guard.as_ref().unwrap().epoch, 1);
        assert_eq!(guard.as_ref().unwrap().math_data, math);
    }

    #[tokio::test]
    async fn score_commit_and_reveal_two_epochs_later() {
        let dht = dht_for(5, 0.7);
        let engine = CommitRevealEngine::new(PrivateKey::generate_ed25519(), dht, CommitRevealConfig::default()).unwrap();
        let scores = vec![SubnetNodeConsensusData { subnet_node_id: 1, score: 10u128.pow(18) }];
        assert!(engine.score_commit(5, 0.7, scores.clone()).await);
        assert!(engine.latest_scores_commit.lock().contains_key(&5));
    }
}
