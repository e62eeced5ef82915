pub mod dht_keys;
pub mod domain;
pub mod epoch;
pub mod error;
pub mod subnet_constants;
pub mod types;

pub use domain::{
    AccessToken, AttestEntry, Classification, ConsensusData, ConsensusScores, MathData,
    NodeState, RequestAuthInfo, ResponseAuthInfo, SubnetChainInfo, SubnetNodeConsensusData,
    SubnetNodeInfo, SubnetState,
};
pub use epoch::{epoch_data_network, epoch_data_subnet, EpochClock, EpochData};
pub use error::{CoreError, Result};
pub use types::{BlockHeight, EpochNumber, Hash, PeerId, Receipt, SubnetId, SubnetNodeId};
