//! Per-epoch commit-reveal schema enforcement.
//!
//! Gates which key families may be stored, when in the epoch they may be
//! stored, how long their expiration may run, and how many times a given
//! peer may store under a family in a given epoch. Runs after the Signed
//! Record Validator (priority 10 > this validator's priority).

use std::collections::HashMap;

use parking_lot::Mutex;
use subnet_core::dht_keys::KeyFamily;
use subnet_core::epoch::EpochData;
use subnet_core::subnet_constants::{
    max_commit_time_secs, max_heart_beat_time_secs, max_reveal_time_secs, MAX_EPOCH_HISTORY,
    SCORES_REVEAL_DEADLINE, VERIFIER_COMMIT_DEADLINE, VERIFIER_REVEAL_DEADLINE,
};
use subnet_core::types::EpochNumber;

use crate::record::{DhtOp, DhtRecord};

pub const PREDICATE_VALIDATOR_PRIORITY: i32 = 5;

type QuotaKey = (String, EpochNumber, KeyFamily);

/// Per-peer-per-epoch store counters. The predicate is idempotent within a
/// phase in the sense that exceeding the quota always rejects the same way
/// regardless of how many times it is asked — it does not special-case a
/// record that was already accepted.
pub struct PredicateValidator {
    counts: Mutex<HashMap<QuotaKey, u32>>,
}

impl Default for PredicateValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl PredicateValidator {
    pub fn new() -> Self {
        Self { counts: Mutex::new(HashMap::new()) }
    }

    pub fn priority(&self) -> i32 {
        PREDICATE_VALIDATOR_PRIORITY
    }

    /// Merging two predicate validators keeps one instance's counters —
    /// there is only ever meant to be one live instance per node, so this
    /// just satisfies the documented merge contract.
    pub fn merge_with(self: &std::sync::Arc<Self>, _other: &std::sync::Arc<Self>) -> std::sync::Arc<Self> {
        self.clone()
    }

    /// `peer` identifies the DHT caller (its public key tag or peer id),
    /// independent of any `[owner:]` tag embedded in the record itself.
    /// `now` is the subnet-local epoch clock; `now_unix` is wall-clock
    /// seconds, used only to bound how far in the future an expiration may
    /// be set.
    pub fn validate(&self, record: &DhtRecord, op: DhtOp, peer: &str, now: &EpochData, now_unix: f64) -> bool {
        if op == DhtOp::Get {
            return true;
        }

        let family = match KeyFamily::resolve(&record.key, now.epoch) {
            Some(family) => family,
            None => return false,
        };

        if !Self::phase_allows(family, now.percent_complete) {
            return false;
        }
        if !Self::expiration_allows(family, record.expiration_time, now_unix) {
            return false;
        }
        self.check_and_increment_quota(peer, now.epoch, family)
    }

    fn phase_allows(family: KeyFamily, percent_complete: f64) -> bool {
        match family {
            KeyFamily::Node => true,
            KeyFamily::VerifierCommit => percent_complete <= VERIFIER_COMMIT_DEADLINE,
            KeyFamily::VerifierReveal => {
                percent_complete > VERIFIER_COMMIT_DEADLINE && percent_complete <= VERIFIER_REVEAL_DEADLINE
            }
            KeyFamily::ScoresReveal => {
                percent_complete > VERIFIER_COMMIT_DEADLINE && percent_complete <= SCORES_REVEAL_DEADLINE
            }
            KeyFamily::ScoresCommit => percent_complete > SCORES_REVEAL_DEADLINE,
        }
    }

    fn expiration_allows(family: KeyFamily, expiration_time: f64, now_unix: f64) -> bool {
        let ttl = expiration_time - now_unix;
        if ttl < 0.0 {
            return false;
        }
        let max_ttl = match family {
            KeyFamily::Node => max_heart_beat_time_secs(),
            KeyFamily::VerifierCommit => max_commit_time_secs(),
            KeyFamily::VerifierReveal | KeyFamily::ScoresReveal => max_reveal_time_secs(),
            KeyFamily::ScoresCommit => max_commit_time_secs(),
        };
        ttl <= max_ttl
    }

    fn check_and_increment_quota(&self, peer: &str, epoch: EpochNumber, family: KeyFamily) -> bool {
        let mut counts = self.counts.lock();
        counts.retain(|(_, e, _), _| epoch.saturating_sub(*e) <= MAX_EPOCH_HISTORY);

        let key = (peer.to_string(), epoch, family);
        let limit = family.per_peer_epoch_limit();
        let entry = counts.entry(key).or_insert(0);
        if *entry >= limit {
            return false;
        }
        *entry += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subnet_core::dht_keys::{scores_commit_key, scores_reveal_key, verifier_commit_key, verifier_reveal_key};
    use subnet_core::epoch::epoch_data_network;

    fn epoch_at(percent: f64) -> EpochData {
        // epoch_length=100, block_secs=1 keeps the math simple for tests.
        let blocks_elapsed = (percent * 100.0) as u64;
        epoch_data_network(7 * 100 + blocks_elapsed, 100, 1)
    }

    #[test]
    fn commit_allowed_before_deadline_rejected_after() {
        let pv = PredicateValidator::new();
        let record = DhtRecord::new(verifier_commit_key(7), "s", vec![], 1_000_000.0);
        assert!(pv.validate(&record, DhtOp::Post, "peer-a", &epoch_at(0.4), 999_999.0));

        let pv2 = PredicateValidator::new();
        let record = DhtRecord::new(verifier_commit_key(7), "s", vec![], 1_000_000.0);
        assert!(!pv2.validate(&record, DhtOp::Post, "peer-a", &epoch_at(0.6), 999_999.0));
    }

    #[test]
    fn reveal_window_requires_past_commit_deadline() {
        let pv = PredicateValidator::new();
        let record = DhtRecord::new(verifier_reveal_key(7), "s", vec![], 1_000_000.0);
        assert!(!pv.validate(&record, DhtOp::Post, "peer-a", &epoch_at(0.4), 999_999.0));
        assert!(pv.validate(&record, DhtOp::Post, "peer-a", &epoch_at(0.55), 999_999.0));
        assert!(!pv.validate(&record, DhtOp::Post, "peer-a", &epoch_at(0.7), 999_999.0));
    }

    #[test]
    fn score_commit_only_after_reveal_deadline() {
        let pv = PredicateValidator::new();
        let record = DhtRecord::new(scores_commit_key(7), "s", vec![], 1_000_000.0);
        assert!(!pv.validate(&record, DhtOp::Post, "peer-a", &epoch_at(0.6), 999_999.0));
        assert!(pv.validate(&record, DhtOp::Post, "peer-a", &epoch_at(0.7), 999_999.0));
    }

    #[test]
    fn per_peer_quota_enforced_exactly() {
        let pv = PredicateValidator::new();
        let epoch = epoch_at(0.3);
        let make = || DhtRecord::new(verifier_commit_key(epoch.epoch), "s", vec![], 1_000_000.0);
        assert!(pv.validate(&make(), DhtOp::Post, "peer-a", &epoch, 999_999.0));
        assert!(!pv.validate(&make(), DhtOp::Post, "peer-a", &epoch, 999_999.0));
        // A different peer gets its own quota.
        assert!(pv.validate(&make(), DhtOp::Post, "peer-b", &epoch, 999_999.0));
    }

    #[test]
    fn heartbeat_quota_allows_up_to_one_hundred() {
        let pv = PredicateValidator::new();
        let epoch = epoch_at(0.1);
        for _ in 0..100 {
            let record = DhtRecord::new("node", "s", vec![], 1_000_000.0);
            assert!(pv.validate(&record, DhtOp::Post, "peer-a", &epoch, 999_999.0));
        }
        let record = DhtRecord::new("node", "s", vec![], 1_000_000.0);
        assert!(!pv.validate(&record, DhtOp::Post, "peer-a", &epoch, 999_999.0));
    }

    #[test]
    fn unknown_key_family_rejected() {
        let pv = PredicateValidator::new();
        let record = DhtRecord::new("totally_unknown", "s", vec![], 1_000_000.0);
        assert!(!pv.validate(&record, DhtOp::Post, "peer-a", &epoch_at(0.3), 999_999.0));
    }

    #[test]
    fn expiration_beyond_bound_rejected() {
        let pv = PredicateValidator::new();
        let record = DhtRecord::new("node", "s", vec![], 1_000_000.0 + max_heart_beat_time_secs() + 1.0);
        assert!(!pv.validate(&record, DhtOp::Post, "peer-a", &epoch_at(0.1), 1_000_000.0));
    }

    #[test]
    fn get_always_allowed() {
        let pv = PredicateValidator::new();
        let record = DhtRecord::new(scores_reveal_key(7), "s", vec![], 1_000_000.0);
        assert!(pv.validate(&record, DhtOp::Get, "peer-a", &epoch_at(0.9), 999_999.0));
    }
}
