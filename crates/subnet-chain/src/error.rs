use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("on-chain submission failed: {0}")]
    OnChainFailure(String),

    #[error("core error: {0}")]
    Core(#[from] subnet_core::CoreError),
}

pub type Result<T> = std::result::Result<T, ChainError>;
