//! Consensus Loop (§4.7): the per-epoch orchestrator tying the on-chain
//! validator election to the Task Commit-Reveal Engine's phase windows.
//!
//! Pre-start gates (subnet `Active`, local classification ≥ `Idle`) and the
//! validator/attestor branch are driven here; the actual commit/reveal/score
//! math lives in [`crate::commit_reveal`] and [`crate::scoring`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use subnet_chain::ChainClient;
use subnet_core::domain::{Classification, ConsensusData, MathData, SubnetNodeConsensusData, SubnetState};
use subnet_core::epoch::EpochClock;
use subnet_core::types::{EpochNumber, PeerId, SubnetId, SubnetNodeId};

use crate::commit_reveal::CommitRevealEngine;
use crate::error::Result;
use crate::scoring::compare_consensus_data;

/// `percent_complete` ceiling for polling the validator's proposal before
/// an attestor gives up on this epoch.
pub const ATTESTATION_POLL_DEADLINE: f64 = 0.15;
/// Consecutive missing/erroring on-chain reads tolerated before a
/// pre-start gate or election poll aborts.
pub const MAX_MISSING_READS: u32 = 3;

pub struct ConsensusLoopConfig {
    pub subnet_id: SubnetId,
    pub self_subnet_node_id: SubnetNodeId,
    pub block_secs: u64,
}

/// Owns the attestation/proposal dedup sets and the most recent epoch's
/// scored output (§3 Ownership — mutated only by the task driving this
/// loop).
pub struct ConsensusLoop {
    chain: Arc<dyn ChainClient>,
    engine: Arc<CommitRevealEngine>,
    clock: Arc<dyn EpochClock>,
    config: ConsensusLoopConfig,
    proposed_epochs: Mutex<HashSet<EpochNumber>>,
    attested_epochs: Mutex<HashSet<EpochNumber>>,
    verified_epochs: Mutex<HashSet<EpochNumber>>,
    last_scores: Mutex<Option<(EpochNumber, Vec<SubnetNodeConsensusData>)>>,
}

impl ConsensusLoop {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        engine: Arc<CommitRevealEngine>,
        clock: Arc<dyn EpochClock>,
        config: ConsensusLoopConfig,
    ) -> Self {
        Self {
            chain,
            engine,
            clock,
            config,
            proposed_epochs: Mutex::new(HashSet::new()),
            attested_epochs: Mutex::new(HashSet::new()),
            verified_epochs: Mutex::new(HashSet::new()),
            last_scores: Mutex::new(None),
        }
    }

    /// Sleeps for `dur`, waking early if shutdown is signalled. Returns
    /// `false` if shutdown won and the caller should bail out.
    async fn sleep_or_stop(&self, dur: Duration, stop: &mut watch::Receiver<bool>) -> bool {
        if *stop.borrow() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(dur) => true,
            changed = stop.changed() => changed.is_err() || !*stop.borrow(),
        }
    }

    fn block_interval(&self) -> Duration {
        Duration::from_secs(self.config.block_secs.max(1))
    }

    /// Pre-start gate (a): block-rate poll until the subnet reports
    /// `Active`, aborting after `MAX_MISSING_READS` consecutive missing or
    /// erroring reads.
    pub async fn wait_until_subnet_active(&self, stop: &mut watch::Receiver<bool>) -> bool {
        let mut missing = 0u32;
        loop {
            match self.chain.get_formatted_subnet_info(self.config.subnet_id).await {
                Ok(Some(info)) if info.state == SubnetState::Active => return true,
                Ok(Some(_)) => missing = 0,
                Ok(None) | Err(_) => {
                    missing += 1;
                    if missing >= MAX_MISSING_READS {
                        warn!("subnet {} never reached Active after {} reads", self.config.subnet_id, missing);
                        return false;
                    }
                }
            }
            if !self.sleep_or_stop(self.block_interval(), stop).await {
                return false;
            }
        }
    }

    /// Pre-start gate (b): the local node must be classified `Idle` or
    /// higher before joining the loop (Included nodes participate in
    /// consensus data to graduate; Validator-class is additionally
    /// required to attest, checked per-epoch in [`Self::run_epoch`]).
    pub async fn wait_until_locally_ready(&self, stop: &mut watch::Receiver<bool>) -> bool {
        let mut missing = 0u32;
        loop {
            let epoch = self.clock.current().epoch;
            match self
                .chain
                .get_min_class_subnet_nodes_formatted(self.config.subnet_id, epoch, Classification::Idle)
                .await
            {
                Ok(nodes) => {
                    if nodes.iter().any(|n| n.subnet_node_id == self.config.self_subnet_node_id) {
                        return true;
                    }
                    missing = 0;
                }
                Err(_) => {
                    missing += 1;
                    if missing >= MAX_MISSING_READS {
                        return false;
                    }
                }
            }
            if !self.sleep_or_stop(self.block_interval(), stop).await {
                return false;
            }
        }
    }

    async fn poll_rewards_validator(&self, epoch: EpochNumber, stop: &mut watch::Receiver<bool>) -> Option<SubnetNodeId> {
        let mut missing = 0u32;
        loop {
            match self.chain.get_rewards_validator(self.config.subnet_id, epoch).await {
                Ok(Some(id)) => return Some(id),
                Ok(None) => missing = 0,
                Err(_) => {
                    missing += 1;
                    if missing >= MAX_MISSING_READS {
                        return None;
                    }
                }
            }
            if self.clock.current().epoch != epoch {
                return None;
            }
            if !self.sleep_or_stop(self.block_interval(), stop).await {
                return None;
            }
        }
    }

    async fn poll_consensus_proposal(&self, epoch: EpochNumber, stop: &mut watch::Receiver<bool>) -> Option<ConsensusData> {
        loop {
            let now = self.clock.current();
            if now.epoch != epoch || now.percent_complete > ATTESTATION_POLL_DEADLINE {
                return None;
            }
            match self.chain.get_consensus_data_formatted(self.config.subnet_id, epoch).await {
                Ok(Some(data)) => return Some(data),
                Ok(None) | Err(_) => {}
            }
            if !self.sleep_or_stop(self.block_interval(), stop).await {
                return None;
            }
        }
    }

    /// Step 3: if elected validator for this epoch, submit the proposal —
    /// even an empty one, since an empty attestation only costs a
    /// subnet-level penalty while silence risks a validator-level one.
    async fn propose_if_elected(&self, epoch: EpochNumber, validator_id: SubnetNodeId) -> Result<()> {
        if validator_id != self.config.self_subnet_node_id {
            return Ok(());
        }
        if self.proposed_epochs.lock().contains(&epoch) {
            return Ok(());
        }
        let scores = self
            .last_scores
            .lock()
            .as_ref()
            .filter(|(e, _)| *e == epoch.saturating_sub(1))
            .map(|(_, s)| s.clone())
            .unwrap_or_default();
        self.chain.propose_attestation(self.config.subnet_id, scores).await?;
        self.proposed_epochs.lock().insert(epoch);
        Ok(())
    }

    /// Step 4: if not elected, poll for the validator's proposal and
    /// attest only when it matches this node's own scores exactly
    /// (Jaccard == 1.0); otherwise abstain silently.
    async fn attest_if_matching(
        &self,
        epoch: EpochNumber,
        validator_id: SubnetNodeId,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        if validator_id == self.config.self_subnet_node_id {
            return Ok(());
        }
        if self.attested_epochs.lock().contains(&epoch) {
            return Ok(());
        }
        let own_scores = match self.last_scores.lock().as_ref().filter(|(e, _)| *e == epoch.saturating_sub(1)) {
            Some((_, s)) => s.clone(),
            None => return Ok(()),
        };
        let Some(proposal) = self.poll_consensus_proposal(epoch, stop).await else { return Ok(()) };
        if compare_consensus_data(&own_scores, &proposal.data) == 1.0 {
            self.chain.attest(self.config.subnet_id).await?;
            self.attested_epochs.lock().insert(epoch);
        }
        Ok(())
    }

    /// Step 5: drive the commit-reveal engine's phases in window order,
    /// bailing out if the epoch clock has already advanced past them.
    async fn drive_commit_reveal(
        &self,
        epoch: EpochNumber,
        subnet_id: SubnetId,
        math_data: &[MathData],
        peer_to_subnet_node_id: &HashMap<PeerId, u32>,
    ) -> Result<()> {
        let percent = self.clock.current().percent_complete;
        self.engine.task_commit(epoch, percent, math_data.to_vec()).await;

        let percent = self.clock.current().percent_complete;
        self.engine.task_reveal(epoch, percent).await;

        let percent = self.clock.current().percent_complete;
        self.engine.score_reveal(epoch, percent).await;

        let percent = self.clock.current().percent_complete;
        if percent > self.engine.config().scores_reveal_deadline && !self.verified_epochs.lock().contains(&epoch) {
            let (_, on_chain) =
                self.engine.verify_and_score(epoch, subnet_id, self.chain.as_ref(), peer_to_subnet_node_id).await?;
            self.last_scores.lock().replace((epoch, on_chain.clone()));
            self.verified_epochs.lock().insert(epoch);
            self.engine.score_commit(epoch, percent, on_chain).await;
        }
        Ok(())
    }

    /// One full epoch's worth of orchestration (steps 1-5). Called once
    /// per detected epoch boundary by whoever drives the node's
    /// cooperative task set.
    pub async fn run_epoch(
        &self,
        math_data: Vec<MathData>,
        peer_to_subnet_node_id: &HashMap<PeerId, u32>,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let epoch = self.clock.current().epoch;
        debug!(epoch, "entering consensus loop epoch");

        if let Some(validator_id) = self.poll_rewards_validator(epoch, stop).await {
            self.propose_if_elected(epoch, validator_id).await?;
            self.attest_if_matching(epoch, validator_id, stop).await?;
        } else {
            info!(epoch, "no rewards validator resolved for epoch, skipping attestation step");
        }

        self.drive_commit_reveal(epoch, self.config.subnet_id, &math_data, peer_to_subnet_node_id).await
    }
}
