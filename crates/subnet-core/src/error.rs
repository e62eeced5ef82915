use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("crypto error: {0}")]
    CryptoError(#[from] subnet_crypto::CryptoError),

    #[error("stale epoch: {0}")]
    StaleEpoch(String),

    #[error("fatal configuration error: {0}")]
    FatalConfig(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
