//! A file-backed-in-spirit, in-memory mock chain client for single-process
//! test harnesses. Every method is driven purely by state a test sets up
//! beforehand — there is no real network or consensus behind it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use subnet_core::domain::{
    Classification, ConsensusData, SubnetChainInfo, SubnetNodeConsensusData, SubnetNodeInfo, SubnetState,
};
use subnet_core::epoch::{epoch_data_network, epoch_data_subnet, EpochData};
use subnet_core::types::{BlockHeight, EpochNumber, Receipt, SubnetId, SubnetNodeId};

use crate::client::ChainClient;
use crate::error::Result;

pub struct MockChainClient {
    block: RwLock<BlockHeight>,
    epoch_length: u64,
    block_secs: u64,
    subnet_slot: RwLock<HashMap<SubnetId, BlockHeight>>,
    subnet_info: RwLock<HashMap<SubnetId, SubnetChainInfo>>,
    subnet_nodes: RwLock<HashMap<SubnetId, Vec<SubnetNodeInfo>>>,
    rewards_validator: RwLock<HashMap<(SubnetId, EpochNumber), SubnetNodeId>>,
    consensus_data: RwLock<HashMap<(SubnetId, EpochNumber), ConsensusData>>,
    proof_of_stake: RwLock<HashMap<Vec<u8>, bool>>,
    proposals: RwLock<HashMap<(SubnetId, EpochNumber), Vec<SubnetNodeConsensusData>>>,
    attestation_calls: RwLock<HashMap<(SubnetId, EpochNumber), u32>>,
    fail_next_submission: AtomicBool,
}

impl MockChainClient {
    pub fn new(epoch_length: u64, block_secs: u64) -> Self {
        Self {
            block: RwLock::new(0),
            epoch_length,
            block_secs,
            subnet_slot: RwLock::new(HashMap::new()),
            subnet_info: RwLock::new(HashMap::new()),
            subnet_nodes: RwLock::new(HashMap::new()),
            rewards_validator: RwLock::new(HashMap::new()),
            consensus_data: RwLock::new(HashMap::new()),
            proof_of_stake: RwLock::new(HashMap::new()),
            proposals: RwLock::new(HashMap::new()),
            attestation_calls: RwLock::new(HashMap::new()),
            fail_next_submission: AtomicBool::new(false),
        }
    }

    pub fn set_block(&self, block: BlockHeight) {
        *self.block.write() = block;
    }

    pub fn advance_block(&self, by: BlockHeight) {
        *self.block.write() += by;
    }

    pub fn register_subnet(&self, subnet_id: SubnetId, slot: BlockHeight, state: SubnetState) {
        self.subnet_slot.write().insert(subnet_id, slot);
        self.subnet_info.write().insert(subnet_id, SubnetChainInfo { state, slot_index: slot });
    }

    pub fn set_subnet_state(&self, subnet_id: SubnetId, state: SubnetState) {
        if let Some(info) = self.subnet_info.write().get_mut(&subnet_id) {
            info.state = state;
        }
    }

    pub fn set_subnet_nodes(&self, subnet_id: SubnetId, nodes: Vec<SubnetNodeInfo>) {
        self.subnet_nodes.write().insert(subnet_id, nodes);
    }

    pub fn set_rewards_validator(&self, subnet_id: SubnetId, epoch: EpochNumber, validator: SubnetNodeId) {
        self.rewards_validator.write().insert((subnet_id, epoch), validator);
    }

    pub fn set_consensus_data(&self, subnet_id: SubnetId, epoch: EpochNumber, data: ConsensusData) {
        self.consensus_data.write().insert((subnet_id, epoch), data);
    }

    pub fn set_proof_of_stake(&self, peer_id: &[u8], allowed: bool) {
        self.proof_of_stake.write().insert(peer_id.to_vec(), allowed);
    }

    pub fn fail_next_submission(&self) {
        self.fail_next_submission.store(true, Ordering::SeqCst);
    }

    pub fn proposal_for(&self, subnet_id: SubnetId, epoch: EpochNumber) -> Option<Vec<SubnetNodeConsensusData>> {
        self.proposals.read().get(&(subnet_id, epoch)).cloned()
    }

    pub fn attest_call_count(&self, subnet_id: SubnetId, epoch: EpochNumber) -> u32 {
        self.attestation_calls.read().get(&(subnet_id, epoch)).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn get_epoch_data(&self) -> Result<EpochData> {
        Ok(epoch_data_network(*self.block.read(), self.epoch_length, self.block_secs))
    }

    async fn get_subnet_epoch_data(&self, slot: BlockHeight) -> Result<EpochData> {
        Ok(epoch_data_subnet(*self.block.read(), slot, self.epoch_length, self.block_secs))
    }

    async fn get_subnet_slot(&self, subnet_id: SubnetId) -> Result<Option<BlockHeight>> {
        Ok(self.subnet_slot.read().get(&subnet_id).copied())
    }

    async fn get_formatted_subnet_info(&self, subnet_id: SubnetId) -> Result<Option<SubnetChainInfo>> {
        Ok(self.subnet_info.read().get(&subnet_id).cloned())
    }

    async fn get_min_class_subnet_nodes_formatted(
        &self,
        subnet_id: SubnetId,
        _epoch: EpochNumber,
        min_class: Classification,
    ) -> Result<Vec<SubnetNodeInfo>> {
        Ok(self
            .subnet_nodes
            .read()
            .get(&subnet_id)
            .map(|nodes| nodes.iter().filter(|n| n.classification >= min_class).cloned().collect())
            .unwrap_or_default())
    }

    async fn get_rewards_validator(&self, subnet_id: SubnetId, epoch: EpochNumber) -> Result<Option<SubnetNodeId>> {
        Ok(self.rewards_validator.read().get(&(subnet_id, epoch)).copied())
    }

    async fn get_consensus_data_formatted(
        &self,
        subnet_id: SubnetId,
        epoch: EpochNumber,
    ) -> Result<Option<ConsensusData>> {
        Ok(self.consensus_data.read().get(&(subnet_id, epoch)).cloned())
    }

    async fn propose_attestation(
        &self,
        subnet_id: SubnetId,
        data: Vec<SubnetNodeConsensusData>,
    ) -> Result<Receipt> {
        if self.fail_next_submission.swap(false, Ordering::SeqCst) {
            return Err(crate::error::ChainError::OnChainFailure("mock submission failure".into()));
        }
        let epoch = self.get_epoch_data().await?.epoch;
        self.proposals.write().insert((subnet_id, epoch), data);
        Ok(Receipt { success: true, block_height: *self.block.read() })
    }

    async fn attest(&self, subnet_id: SubnetId) -> Result<Receipt> {
        if self.fail_next_submission.swap(false, Ordering::SeqCst) {
            return Err(crate::error::ChainError::OnChainFailure("mock submission failure".into()));
        }
        let epoch = self.get_epoch_data().await?.epoch;
        *self.attestation_calls.write().entry((subnet_id, epoch)).or_insert(0) += 1;
        Ok(Receipt { success: true, block_height: *self.block.read() })
    }

    async fn proof_of_stake(&self, _subnet_id: SubnetId, peer_id: &[u8], _min_class: Classification) -> Result<bool> {
        Ok(self.proof_of_stake.read().get(peer_id).copied().unwrap_or(false))
    }
}
