use thiserror::Error;

#[derive(Error, Debug)]
pub enum DhtError {
    #[error("record rejected: {0}")]
    RecordRejected(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] subnet_crypto::CryptoError),

    #[error("core error: {0}")]
    Core(#[from] subnet_core::CoreError),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, DhtError>;
