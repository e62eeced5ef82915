use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error("stale epoch: {0}")]
    StaleEpoch(String),

    #[error("commit-reveal soundness failure: {0}")]
    CommitRevealMismatch(String),

    #[error("fatal configuration error: {0}")]
    FatalConfig(String),

    #[error("on-chain failure: {0}")]
    OnChainFailure(String),

    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("core error: {0}")]
    Core(#[from] subnet_core::CoreError),

    #[error("crypto error: {0}")]
    Crypto(#[from] subnet_crypto::CryptoError),

    #[error("chain error: {0}")]
    Chain(#[from] subnet_chain::ChainError),
}

pub type Result<T> = std::result::Result<T, ConsensusError>;
