//! Proof-of-stake authorization (§4.5): wraps the signature authorizer,
//! then checks on-chain stake per peer with TTL'd success/failure caches so
//! a hostile peer cannot force a chain query on every single request.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use subnet_chain::ChainClient;
use subnet_core::domain::Classification;
use subnet_core::domain::RequestAuthInfo;
use subnet_core::types::SubnetId;

use crate::error::{Result, RpcError};
use crate::signature_authorizer::SignatureAuthorizer;

pub const POS_CACHE_TTL_SECS: f64 = 300.0;

fn unix_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

struct CacheEntry {
    stamped_at: f64,
}

/// Per-peer success/failure caches, each with its own TTL. A fresh verdict
/// of one kind evicts any stale entry of the other kind for the same peer.
#[derive(Default)]
struct PosCaches {
    success: HashMap<Vec<u8>, CacheEntry>,
    failure: HashMap<Vec<u8>, CacheEntry>,
}

pub struct PosAuthorizer {
    signature_authorizer: SignatureAuthorizer,
    chain: Arc<dyn ChainClient>,
    subnet_id: SubnetId,
    caches: Mutex<PosCaches>,
}

impl PosAuthorizer {
    pub fn new(signature_authorizer: SignatureAuthorizer, chain: Arc<dyn ChainClient>, subnet_id: SubnetId) -> Self {
        Self { signature_authorizer, chain, subnet_id, caches: Mutex::new(PosCaches::default()) }
    }

    pub fn signature_authorizer(&self) -> &SignatureAuthorizer {
        &self.signature_authorizer
    }

    fn cached_verdict(&self, peer_key: &[u8], now: f64) -> Option<bool> {
        let caches = self.caches.lock();
        if let Some(entry) = caches.success.get(peer_key) {
            if now - entry.stamped_at <= POS_CACHE_TTL_SECS {
                return Some(true);
            }
        }
        if let Some(entry) = caches.failure.get(peer_key) {
            if now - entry.stamped_at <= POS_CACHE_TTL_SECS {
                return Some(false);
            }
        }
        None
    }

    fn record_verdict(&self, peer_key: Vec<u8>, verdict: bool, now: f64) {
        let mut caches = self.caches.lock();
        if verdict {
            caches.failure.remove(&peer_key);
            caches.success.insert(peer_key, CacheEntry { stamped_at: now });
        } else {
            caches.success.remove(&peer_key);
            caches.failure.insert(peer_key, CacheEntry { stamped_at: now });
        }
    }

    /// Validate the request's signature, then require the caller to hold at
    /// least `min_class` stake on-chain for this subnet.
    pub async fn authorize(&self, req: &RequestAuthInfo, min_class: Classification) -> Result<()> {
        self.signature_authorizer.validate_request(req)?;

        let peer_key = req.client_access_token.public_key.clone();
        let now = unix_now();
        if let Some(verdict) = self.cached_verdict(&peer_key, now) {
            return if verdict {
                Ok(())
            } else {
                Err(RpcError::UnauthorizedPeer("peer fails proof-of-stake (cached)".into()))
            };
        }

        let verdict = self.chain.proof_of_stake(self.subnet_id, &peer_key, min_class).await?;
        self.record_verdict(peer_key, verdict, now);

        if verdict {
            Ok(())
        } else {
            Err(RpcError::UnauthorizedPeer("peer fails proof-of-stake".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subnet_chain::MockChainClient;
    use subnet_crypto::PrivateKey;

    fn authorizer(chain: Arc<MockChainClient>) -> PosAuthorizer {
        let sig_auth = SignatureAuthorizer::new(PrivateKey::generate_ed25519(), "node-a");
        PosAuthorizer::new(sig_auth, chain, 1)
    }

    #[tokio::test]
    async fn peer_without_stake_is_rejected() {
        let chain = Arc::new(MockChainClient::new(100, 3));
        let pos = authorizer(chain.clone());
        let req = pos.signature_authorizer().sign_request(None);
        assert!(pos.authorize(&req, Classification::Idle).await.is_err());
    }

    #[tokio::test]
    async fn peer_with_stake_is_authorized_and_cached() {
        let chain = Arc::new(MockChainClient::new(100, 3));
        let pos = authorizer(chain.clone());
        chain.set_proof_of_stake(&pos.signature_authorizer().public_key().to_bytes(), true);

        let req1 = pos.signature_authorizer().sign_request(None);
        assert!(pos.authorize(&req1, Classification::Idle).await.is_ok());

        // Flip on-chain state; cached success should still short-circuit.
        chain.set_proof_of_stake(&pos.signature_authorizer().public_key().to_bytes(), false);
        let req2 = pos.signature_authorizer().sign_request(None);
        assert!(pos.authorize(&req2, Classification::Idle).await.is_ok());
    }
}
