//! Dual Ed25519 / RSA identity keys.
//!
//! DHT record owners and RPC callers may hold either key type; record and
//! request validators dispatch on an explicit type tag embedded in the
//! serialized public key rather than trying to guess the encoding.

use crate::error::{CryptoError, Result};
use ed25519_dalek::{Signature as EdSignature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::pkcs1v15::{Signature as RsaSignature, SigningKey as RsaSigningKey, VerifyingKey as RsaVerifyingKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use signature::{Signer, Verifier};

const TAG_ED25519: u8 = 0x01;
const TAG_RSA: u8 = 0x02;

/// Default RSA modulus size for newly generated identities.
pub const DEFAULT_RSA_BITS: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Ed25519,
    Rsa,
}

/// A long-lived identity private key.
///
/// Both variants already zeroize their scalar/modulus material on drop
/// (`ed25519_dalek::SigningKey` and `rsa::RsaPrivateKey` both derive
/// `ZeroizeOnDrop` upstream), so no manual `Drop` impl is needed here.
pub enum PrivateKey {
    Ed25519(SigningKey),
    Rsa(Box<RsaPrivateKey>),
}

impl PrivateKey {
    pub fn generate_ed25519() -> Self {
        Self::Ed25519(SigningKey::generate(&mut OsRng))
    }

    pub fn generate_rsa(bits: usize) -> Result<Self> {
        let key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::RsaError(e.to_string()))?;
        Ok(Self::Rsa(Box::new(key)))
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            Self::Ed25519(_) => KeyType::Ed25519,
            Self::Rsa(_) => KeyType::Rsa,
        }
    }

    pub fn get_public_key(&self) -> PublicKey {
        match self {
            Self::Ed25519(sk) => PublicKey::Ed25519(sk.verifying_key()),
            Self::Rsa(sk) => PublicKey::Rsa(sk.to_public_key()),
        }
    }

    /// Sign a message, returning the raw signature bytes.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        match self {
            Self::Ed25519(sk) => sk.sign(message).to_bytes().to_vec(),
            Self::Rsa(sk) => {
                let signing_key = RsaSigningKey::<Sha256>::new((**sk).clone());
                let sig: RsaSignature = signing_key.sign(message);
                sig.to_vec()
            }
        }
    }

    /// Tagged serialization for on-disk identity storage: one type-tag byte
    /// followed by the key's native encoding (raw 32-byte scalar for
    /// Ed25519, PKCS#1 DER for RSA).
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Self::Ed25519(sk) => {
                let mut out = Vec::with_capacity(33);
                out.push(TAG_ED25519);
                out.extend_from_slice(sk.to_bytes().as_slice());
                Ok(out)
            }
            Self::Rsa(sk) => {
                let der = sk
                    .to_pkcs1_der()
                    .map_err(|e| CryptoError::RsaError(e.to_string()))?;
                let mut out = Vec::with_capacity(1 + der.as_bytes().len());
                out.push(TAG_RSA);
                out.extend_from_slice(der.as_bytes());
                Ok(out)
            }
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (tag, rest) = bytes.split_first().ok_or(CryptoError::InvalidPrivateKey)?;
        match *tag {
            TAG_ED25519 => {
                let arr: [u8; 32] = rest.try_into().map_err(|_| CryptoError::InvalidPrivateKey)?;
                Ok(Self::Ed25519(SigningKey::from_bytes(&arr)))
            }
            TAG_RSA => {
                let key = RsaPrivateKey::from_pkcs1_der(rest).map_err(|_| CryptoError::InvalidPrivateKey)?;
                Ok(Self::Rsa(Box::new(key)))
            }
            other => Err(CryptoError::UnknownKeyType(other)),
        }
    }
}

/// A public key, tagged with its key type for canonical serialization.
#[derive(Clone)]
pub enum PublicKey {
    Ed25519(VerifyingKey),
    Rsa(RsaPublicKey),
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Ed25519(a), Self::Ed25519(b)) => a == b,
            (Self::Rsa(a), Self::Rsa(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for PublicKey {}

impl PublicKey {
    pub fn key_type(&self) -> KeyType {
        match self {
            Self::Ed25519(_) => KeyType::Ed25519,
            Self::Rsa(_) => KeyType::Rsa,
        }
    }

    /// Canonical tagged serialization: one type-tag byte followed by the
    /// key's native encoding (raw 32 bytes for Ed25519, PKCS#1 DER for RSA).
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Ed25519(vk) => {
                let mut out = Vec::with_capacity(33);
                out.push(TAG_ED25519);
                out.extend_from_slice(vk.as_bytes());
                out
            }
            Self::Rsa(pk) => {
                let der = pk
                    .to_pkcs1_der()
                    .expect("RSA public key always encodes to PKCS#1 DER");
                let mut out = Vec::with_capacity(1 + der.as_bytes().len());
                out.push(TAG_RSA);
                out.extend_from_slice(der.as_bytes());
                out
            }
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (tag, rest) = bytes.split_first().ok_or(CryptoError::InvalidPublicKey)?;
        match *tag {
            TAG_ED25519 => {
                let arr: [u8; 32] = rest.try_into().map_err(|_| CryptoError::InvalidPublicKey)?;
                let vk = VerifyingKey::from_bytes(&arr).map_err(|_| CryptoError::InvalidPublicKey)?;
                Ok(Self::Ed25519(vk))
            }
            TAG_RSA => {
                let pk = RsaPublicKey::from_pkcs1_der(rest).map_err(|_| CryptoError::InvalidPublicKey)?;
                Ok(Self::Rsa(pk))
            }
            other => Err(CryptoError::UnknownKeyType(other)),
        }
    }

    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        match self {
            Self::Ed25519(vk) => match EdSignature::from_slice(signature) {
                Ok(sig) => vk.verify(message, &sig).is_ok(),
                Err(_) => false,
            },
            Self::Rsa(pk) => {
                let verifying_key = RsaVerifyingKey::<Sha256>::new(pk.clone());
                match RsaSignature::try_from(signature) {
                    Ok(sig) => verifying_key.verify(message, &sig).is_ok(),
                    Err(_) => false,
                }
            }
        }
    }
}

/// Load a public key from its tagged serialization.
///
/// Mirrors the dispatch a record validator performs when it pulls a public
/// key out of a DHT key's `[owner:<bytes>]` tag.
pub fn load_public_key_from_bytes(bytes: &[u8]) -> Result<PublicKey> {
    PublicKey::from_bytes(bytes)
}
