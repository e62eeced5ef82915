//! The blockchain client contract (§6). The core only ever consumes this
//! interface — RPC formats, SCALE encoding, and the rest of the chain's
//! transport are explicitly out of scope and never named here.

use async_trait::async_trait;
use subnet_core::domain::{Classification, ConsensusData, SubnetChainInfo, SubnetNodeConsensusData, SubnetNodeInfo};
use subnet_core::epoch::EpochData;
use subnet_core::types::{BlockHeight, EpochNumber, Receipt, SubnetId, SubnetNodeId};

use crate::error::Result;

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn get_epoch_data(&self) -> Result<EpochData>;

    async fn get_subnet_epoch_data(&self, slot: BlockHeight) -> Result<EpochData>;

    async fn get_subnet_slot(&self, subnet_id: SubnetId) -> Result<Option<BlockHeight>>;

    async fn get_formatted_subnet_info(&self, subnet_id: SubnetId) -> Result<Option<SubnetChainInfo>>;

    async fn get_min_class_subnet_nodes_formatted(
        &self,
        subnet_id: SubnetId,
        epoch: EpochNumber,
        min_class: Classification,
    ) -> Result<Vec<SubnetNodeInfo>>;

    async fn get_rewards_validator(&self, subnet_id: SubnetId, epoch: EpochNumber) -> Result<Option<SubnetNodeId>>;

    async fn get_consensus_data_formatted(
        &self,
        subnet_id: SubnetId,
        epoch: EpochNumber,
    ) -> Result<Option<ConsensusData>>;

    async fn propose_attestation(&self, subnet_id: SubnetId, data: Vec<SubnetNodeConsensusData>) -> Result<Receipt>;

    async fn attest(&self, subnet_id: SubnetId) -> Result<Receipt>;

    async fn proof_of_stake(&self, subnet_id: SubnetId, peer_id: &[u8], min_class: Classification) -> Result<bool>;
}
