//! Request/response signing and validation (§4.4).
//!
//! Every outgoing request carries a freshly issued, 60-second-lived
//! `AccessToken` over the caller's own public key, a timestamp, an 8-byte
//! nonce, and a signature over the request with the signature field itself
//! zeroed out before hashing. Validation enforces signature correctness,
//! service-identity targeting, clock skew, and nonce uniqueness.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::Serialize;
use subnet_core::domain::{AccessToken, RequestAuthInfo, ResponseAuthInfo};
use subnet_crypto::{load_public_key_from_bytes, PrivateKey, PublicKey};

use crate::error::{Result, RpcError};
use crate::nonce_store::NonceStore;

pub const ACCESS_TOKEN_VALIDITY_SECS: i64 = 60;
pub const CLOCK_SKEW_SECS: f64 = 60.0;
pub const NONCE_REPLAY_WINDOW_SECS: f64 = 3.0 * ACCESS_TOKEN_VALIDITY_SECS as f64;

/// Signs outgoing requests/responses and validates incoming ones for a
/// single local identity. Owns the process-wide nonce set (§9 "global
/// mutable state").
pub struct SignatureAuthorizer {
    identity: PrivateKey,
    username: String,
    nonces: NonceStore,
}

fn unix_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn random_nonce() -> [u8; 8] {
    let mut nonce = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// Serialize with the signature field zeroed, matching what the verifying
/// side reconstructs before checking the signature.
fn zeroed_signing_bytes<T: Serialize + Clone>(value: &T, clear: impl FnOnce(&mut T)) -> Vec<u8> {
    let mut clone = value.clone();
    clear(&mut clone);
    serde_json::to_vec(&clone).expect("auth envelopes always serialize")
}

impl SignatureAuthorizer {
    pub fn new(identity: PrivateKey, username: impl Into<String>) -> Self {
        Self { identity, username: username.into(), nonces: NonceStore::new(NONCE_REPLAY_WINDOW_SECS) }
    }

    pub fn public_key(&self) -> PublicKey {
        self.identity.get_public_key()
    }

    fn issue_access_token(&self) -> AccessToken {
        let expiration_time: DateTime<Utc> = Utc::now() + Duration::seconds(ACCESS_TOKEN_VALIDITY_SECS);
        let mut token = AccessToken {
            username: self.username.clone(),
            public_key: self.identity.get_public_key().to_bytes(),
            expiration_time: expiration_time.to_rfc3339(),
            signature: Vec::new(),
        };
        let sig = self.identity.sign(&token.signing_payload());
        token.signature = sig;
        token
    }

    fn verify_access_token(token: &AccessToken) -> bool {
        let expires = match DateTime::parse_from_rfc3339(&token.expiration_time) {
            Ok(t) => t.with_timezone(&Utc),
            Err(_) => return false,
        };
        if expires < Utc::now() {
            return false;
        }
        let public_key = match load_public_key_from_bytes(&token.public_key) {
            Ok(pk) => pk,
            Err(_) => return false,
        };
        public_key.verify(&token.signing_payload(), &token.signature)
    }

    /// Stamp and sign a new request, optionally targeting a specific
    /// service public key.
    pub fn sign_request(&self, service_public_key: Option<Vec<u8>>) -> RequestAuthInfo {
        let mut req = RequestAuthInfo {
            client_access_token: self.issue_access_token(),
            service_public_key,
            time: unix_now(),
            nonce: random_nonce(),
            signature: Vec::new(),
        };
        let signing_bytes =
            zeroed_signing_bytes(&req, |r: &mut RequestAuthInfo| r.signature = Vec::new());
        req.signature = self.identity.sign(&signing_bytes);
        req
    }

    /// Validate an incoming request against this node's own public key.
    pub fn validate_request(&self, req: &RequestAuthInfo) -> Result<()> {
        if !Self::verify_access_token(&req.client_access_token) {
            return Err(RpcError::UnauthorizedPeer("access token invalid or expired".into()));
        }

        if let Some(expected) = &req.service_public_key {
            if expected.as_slice() != self.identity.get_public_key().to_bytes().as_slice() {
                return Err(RpcError::UnauthorizedPeer("request targets a different service".into()));
            }
        }

        let now = unix_now();
        if (req.time - now).abs() > CLOCK_SKEW_SECS {
            return Err(RpcError::UnauthorizedPeer("clock skew exceeds bound".into()));
        }

        if !self.nonces.check_and_insert(req.nonce, now) {
            return Err(RpcError::UnauthorizedPeer("nonce replay".into()));
        }

        let caller = load_public_key_from_bytes(&req.client_access_token.public_key)?;
        let signing_bytes =
            zeroed_signing_bytes(req, |r: &mut RequestAuthInfo| r.signature = Vec::new());
        if !caller.verify(&signing_bytes, &req.signature) {
            return Err(RpcError::UnauthorizedPeer("request signature invalid".into()));
        }

        Ok(())
    }

    /// Sign a response, binding it to the request's nonce.
    pub fn sign_response(&self, request_nonce: [u8; 8]) -> ResponseAuthInfo {
        let mut resp = ResponseAuthInfo {
            service_access_token: self.issue_access_token(),
            nonce: request_nonce,
            signature: Vec::new(),
        };
        let signing_bytes =
            zeroed_signing_bytes(&resp, |r: &mut ResponseAuthInfo| r.signature = Vec::new());
        resp.signature = self.identity.sign(&signing_bytes);
        resp
    }

    /// Validate a response against the nonce of the request it answers.
    pub fn validate_response(&self, resp: &ResponseAuthInfo, request_nonce: [u8; 8]) -> Result<()> {
        if !Self::verify_access_token(&resp.service_access_token) {
            return Err(RpcError::UnauthorizedPeer("access token invalid or expired".into()));
        }
        if resp.nonce != request_nonce {
            return Err(RpcError::UnauthorizedPeer("response nonce does not match request".into()));
        }
        let responder = load_public_key_from_bytes(&resp.service_access_token.public_key)?;
        let signing_bytes =
            zeroed_signing_bytes(resp, |r: &mut ResponseAuthInfo| r.signature = Vec::new());
        if !responder.verify(&signing_bytes, &resp.signature) {
            return Err(RpcError::UnauthorizedPeer("response signature invalid".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_request_validates() {
        let auth = SignatureAuthorizer::new(PrivateKey::generate_ed25519(), "node-a");
        let req = auth.sign_request(Some(auth.public_key().to_bytes()));
        assert!(auth.validate_request(&req).is_ok());
    }

    #[test]
    fn replaying_the_same_request_is_rejected() {
        let auth = SignatureAuthorizer::new(PrivateKey::generate_ed25519(), "node-a");
        let req = auth.sign_request(None);
        assert!(auth.validate_request(&req).is_ok());
        assert!(auth.validate_request(&req).is_err());
    }

    #[test]
    fn request_targeting_a_different_service_is_rejected() {
        let auth = SignatureAuthorizer::new(PrivateKey::generate_ed25519(), "node-a");
        let other = PrivateKey::generate_ed25519().get_public_key().to_bytes();
        let req = auth.sign_request(Some(other));
        assert!(auth.validate_request(&req).is_err());
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let auth = SignatureAuthorizer::new(PrivateKey::generate_ed25519(), "node-a");
        let mut req = auth.sign_request(None);
        req.time -= 120.0;
        // Tamper the timestamp only (leave the signature as-is); the clock
        // skew check runs before signature verification.
        assert!(matches!(auth.validate_request(&req), Err(RpcError::UnauthorizedPeer(_))));
    }

    #[test]
    fn response_binds_to_request_nonce() {
        let auth = SignatureAuthorizer::new(PrivateKey::generate_ed25519(), "node-a");
        let req_nonce = [7u8; 8];
        let resp = auth.sign_response(req_nonce);
        assert!(auth.validate_response(&resp, req_nonce).is_ok());
        assert!(auth.validate_response(&resp, [1u8; 8]).is_err());
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let auth = SignatureAuthorizer::new(PrivateKey::generate_ed25519(), "node-a");
        let mut req = auth.sign_request(None);
        req.signature[0] ^= 0xff;
        assert!(auth.validate_request(&req).is_err());
    }
}
