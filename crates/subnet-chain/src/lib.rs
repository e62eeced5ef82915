//! The blockchain client contract this runtime consumes, plus an in-memory
//! mock standing in for a real chain RPC client in tests.

pub mod client;
pub mod error;
pub mod mock;

pub use client::ChainClient;
pub use error::{ChainError, Result};
pub use mock::MockChainClient;

#[cfg(test)]
mod tests {
    use super::*;
    use subnet_core::domain::{Classification, SubnetState};

    #[tokio::test]
    async fn epoch_data_tracks_mock_block_height() {
        let chain = MockChainClient::new(100, 3);
        chain.set_block(250);
        let epoch = chain.get_epoch_data().await.unwrap();
        assert_eq!(epoch.epoch, 2);
    }

    #[tokio::test]
    async fn subnet_state_transitions_are_observable() {
        let chain = MockChainClient::new(100, 3);
        chain.register_subnet(1, 0, SubnetState::Registered);
        assert_eq!(
            chain.get_formatted_subnet_info(1).await.unwrap().unwrap().state,
            SubnetState::Registered
        );
        chain.set_subnet_state(1, SubnetState::Active);
        assert_eq!(chain.get_formatted_subnet_info(1).await.unwrap().unwrap().state, SubnetState::Active);
    }

    #[tokio::test]
    async fn proof_of_stake_defaults_to_false_for_unknown_peers() {
        let chain = MockChainClient::new(100, 3);
        assert!(!chain.proof_of_stake(1, b"unknown-peer", Classification::Idle).await.unwrap());
        chain.set_proof_of_stake(b"unknown-peer", true);
        assert!(chain.proof_of_stake(1, b"unknown-peer", Classification::Idle).await.unwrap());
    }

    #[tokio::test]
    async fn propose_attestation_records_the_proposal_for_current_epoch() {
        use subnet_core::domain::SubnetNodeConsensusData;

        let chain = MockChainClient::new(100, 3);
        chain.set_block(0);
        chain
            .propose_attestation(1, vec![SubnetNodeConsensusData { subnet_node_id: 7, score: 10u128.pow(18) }])
            .await
            .unwrap();
        assert_eq!(chain.proposal_for(1, 0).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn submission_failure_can_be_injected_once() {
        let chain = MockChainClient::new(100, 3);
        chain.fail_next_submission();
        assert!(chain.propose_attestation(1, vec![]).await.is_err());
        assert!(chain.propose_attestation(1, vec![]).await.is_ok());
    }
}
