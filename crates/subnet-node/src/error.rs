//! Top-level error type the binary's `main` matches on, composing every
//! subsystem crate's own error behind one `#[from]` chain.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error(transparent)]
    Core(#[from] subnet_core::CoreError),

    #[error(transparent)]
    Crypto(#[from] subnet_crypto::CryptoError),

    #[error(transparent)]
    Dht(#[from] subnet_dht::DhtError),

    #[error(transparent)]
    Rpc(#[from] subnet_rpc::RpcError),

    #[error(transparent)]
    Consensus(#[from] subnet_consensus::ConsensusError),

    #[error(transparent)]
    Chain(#[from] subnet_chain::ChainError),

    #[error("fatal configuration error: {0}")]
    FatalConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NodeError>;
