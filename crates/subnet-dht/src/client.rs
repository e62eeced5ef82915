//! The DHT interface the rest of the node consumes (§6): `store`/`get`,
//! with every call passing through the validator chain first. The actual
//! Kademlia/libp2p transport is a black box outside this crate's scope —
//! `InMemoryDht` stands in for it in tests and single-process harnesses.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use subnet_core::epoch::EpochClock;

use crate::record::{DhtOp, DhtRecord};
use crate::validator::{ValidationContext, ValidatorChain};

#[derive(Debug, Clone, PartialEq)]
pub struct ValueEntry {
    pub value: Vec<u8>,
    pub expiration_time: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetResult {
    /// Keyed by the raw, tagged public-key bytes of whoever wrote the entry.
    pub value: HashMap<Vec<u8>, ValueEntry>,
}

#[async_trait]
pub trait DhtClient: Send + Sync {
    async fn store(
        &self,
        key: &str,
        subkey: &str,
        value: Vec<u8>,
        expiration_time: f64,
        signing_public_key: Vec<u8>,
    ) -> bool;

    async fn get(&self, key: &str, latest: bool) -> Option<GetResult>;
}

pub fn unix_now() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

struct StoredEntry {
    value: Vec<u8>,
    expiration_time: f64,
    signing_public_key: Vec<u8>,
}

/// An in-process stand-in for the real Kademlia DHT. Every `store`/`get`
/// runs the same validator chain a production node would use — this is
/// what the end-to-end test scenarios in the spec drive against.
pub struct InMemoryDht {
    records: Mutex<HashMap<String, HashMap<String, StoredEntry>>>,
    validators: ValidatorChain,
    clock: Arc<dyn EpochClock>,
}

impl InMemoryDht {
    pub fn new(validators: ValidatorChain, clock: Arc<dyn EpochClock>) -> Self {
        Self { records: Mutex::new(HashMap::new()), validators, clock }
    }
}

#[async_trait]
impl DhtClient for InMemoryDht {
    async fn store(
        &self,
        key: &str,
        subkey: &str,
        value: Vec<u8>,
        expiration_time: f64,
        signing_public_key: Vec<u8>,
    ) -> bool {
        let record = DhtRecord::new(key, subkey, value.clone(), expiration_time);
        let peer = hex::encode(&signing_public_key);
        let ctx =
            ValidationContext { peer: &peer, epoch: self.clock.current(), now_unix: unix_now() };
        if !self.validators.validate_all(&record, DhtOp::Post, &ctx) {
            return false;
        }

        let mut records = self.records.lock();
        let bucket = records.entry(key.to_string()).or_default();
        bucket.insert(subkey.to_string(), StoredEntry { value, expiration_time, signing_public_key });
        true
    }

    async fn get(&self, key: &str, latest: bool) -> Option<GetResult> {
        let records = self.records.lock();
        let bucket = records.get(key)?;
        if bucket.is_empty() {
            return None;
        }

        let now = unix_now();
        let mut out = HashMap::new();
        for entry in bucket.values() {
            if latest && entry.expiration_time < now {
                continue;
            }
            let record = DhtRecord::new(key, "", entry.value.clone(), entry.expiration_time);
            let peer = hex::encode(&entry.signing_public_key);
            let ctx =
                ValidationContext { peer: &peer, epoch: self.clock.current(), now_unix: now };
            if !self.validators.validate_all(&record, DhtOp::Get, &ctx) {
                continue;
            }
            out.insert(
                entry.signing_public_key.clone(),
                ValueEntry { value: entry.value.clone(), expiration_time: entry.expiration_time },
            );
        }

        if out.is_empty() {
            None
        } else {
            Some(GetResult { value: out })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate_validator::PredicateValidator;
    use crate::signed_validator::{owner_tag, sign_record_value};
    use crate::validator::RecordValidator;
    use subnet_core::epoch::EpochData;
    use subnet_crypto::PrivateKey;

    struct FixedClock(EpochData);
    impl EpochClock for FixedClock {
        fn current(&self) -> EpochData {
            self.0
        }
    }

    fn epoch_at(epoch: u64, percent: f64) -> EpochData {
        EpochData {
            block: epoch * 100,
            epoch,
            block_per_epoch: 100,
            seconds_per_epoch: 300,
            percent_complete: percent,
            blocks_elapsed: (percent * 100.0) as u64,
            blocks_remaining: 100 - (percent * 100.0) as u64,
            seconds_elapsed: 0,
            seconds_remaining: 0,
        }
    }

    fn dht_for_epoch(epoch: u64, percent: f64) -> InMemoryDht {
        let mut chain = ValidatorChain::new();
        chain.register(RecordValidator::Signed(crate::signed_validator::SignedRecordValidator::new()));
        chain.register(RecordValidator::Predicate(Arc::new(PredicateValidator::new())));
        InMemoryDht::new(chain, Arc::new(FixedClock(epoch_at(epoch, percent))))
    }

    #[tokio::test]
    async fn heartbeat_round_trip() {
        let dht = dht_for_epoch(1, 0.1);
        let owner = PrivateKey::generate_ed25519();
        let pub_bytes = owner.get_public_key().to_bytes();
        let stored = dht
            .store("node", "peer-a", b"online".to_vec(), unix_now() + 60.0, pub_bytes.clone())
            .await;
        assert!(stored);

        let result = dht.get("node", true).await.unwrap();
        assert_eq!(result.value.len(), 1);
        assert_eq!(result.value.get(&pub_bytes).unwrap().value, b"online");
    }

    #[tokio::test]
    async fn signed_record_failing_signature_check_never_reaches_storage() {
        let dht = dht_for_epoch(1, 0.1);
        let owner = PrivateKey::generate_ed25519();
        let attacker = PrivateKey::generate_ed25519();
        let key = format!("node_{}", owner_tag(&owner.get_public_key()));
        let value = sign_record_value(&key, "s", b"payload", unix_now() + 10.0, &attacker);
        let stored = dht
            .store(&key, "s", value, unix_now() + 10.0, owner.get_public_key().to_bytes())
            .await;
        assert!(!stored);
    }

    #[tokio::test]
    async fn predicate_rejects_commit_outside_window() {
        let dht = dht_for_epoch(3, 0.9);
        let owner = PrivateKey::generate_ed25519();
        let key = subnet_core::dht_keys::verifier_commit_key(3);
        let stored = dht
            .store(&key, "s", b"digest".to_vec(), unix_now() + 10.0, owner.get_public_key().to_bytes())
            .await;
        assert!(!stored);
    }
}
