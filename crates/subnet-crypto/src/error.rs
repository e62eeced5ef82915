use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid private key")]
    InvalidPrivateKey,

    #[error("unknown key type tag {0:#x}")]
    UnknownKeyType(u8),

    #[error("RSA error: {0}")]
    RsaError(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
