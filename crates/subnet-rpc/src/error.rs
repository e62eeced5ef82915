use thiserror::Error;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("unauthorized peer: {0}")]
    UnauthorizedPeer(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] subnet_crypto::CryptoError),

    #[error("chain error: {0}")]
    Chain(#[from] subnet_chain::ChainError),
}

pub type Result<T> = std::result::Result<T, RpcError>;
