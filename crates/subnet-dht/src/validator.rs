//! Dynamic dispatch over the two validator kinds, matching the tagged
//! variant the design notes call for: pattern-match rather than a trait
//! object, since the set of kinds is closed and small.

use std::sync::Arc;

use subnet_core::epoch::EpochData;

use crate::predicate_validator::PredicateValidator;
use crate::record::{DhtOp, DhtRecord};
use crate::signed_validator::SignedRecordValidator;

/// Everything a validator needs besides the record and the operation: who
/// is performing the DHT call, and the subnet-local epoch clock at the
/// moment of the call.
pub struct ValidationContext<'a> {
    pub peer: &'a str,
    pub epoch: EpochData,
    pub now_unix: f64,
}

#[derive(Clone)]
pub enum RecordValidator {
    Signed(SignedRecordValidator),
    Predicate(Arc<PredicateValidator>),
}

impl RecordValidator {
    pub fn priority(&self) -> i32 {
        match self {
            Self::Signed(v) => v.priority(),
            Self::Predicate(v) => v.priority(),
        }
    }

    pub fn validate(&self, record: &DhtRecord, op: DhtOp, ctx: &ValidationContext<'_>) -> bool {
        match self {
            Self::Signed(v) => v.validate(record, op),
            Self::Predicate(v) => v.validate(record, op, ctx.peer, &ctx.epoch, ctx.now_unix),
        }
    }

    /// `Some` only when both sides are the same kind; merging across kinds
    /// makes no sense and is a caller bug, not a record-validation concern.
    pub fn merge_with(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Signed(a), Self::Signed(b)) => Some(Self::Signed(a.merge_with(b))),
            (Self::Predicate(a), Self::Predicate(b)) => Some(Self::Predicate(a.merge_with(b))),
            _ => None,
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Self::Signed(_) => 0,
            Self::Predicate(_) => 1,
        }
    }
}

/// A priority-sorted, duplicate-collapsed chain of validators. Every DHT
/// `store`/`get` is checked against `validate_all`, which short-circuits at
/// the first rejection (highest priority first).
#[derive(Clone, Default)]
pub struct ValidatorChain {
    validators: Vec<RecordValidator>,
}

impl ValidatorChain {
    pub fn new() -> Self {
        Self { validators: Vec::new() }
    }

    pub fn register(&mut self, validator: RecordValidator) {
        if let Some(existing) = self.validators.iter_mut().find(|v| v.kind_rank() == validator.kind_rank()) {
            if let Some(merged) = existing.merge_with(&validator) {
                *existing = merged;
                self.resort();
                return;
            }
        }
        self.validators.push(validator);
        self.resort();
    }

    fn resort(&mut self) {
        self.validators.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    pub fn validate_all(&self, record: &DhtRecord, op: DhtOp, ctx: &ValidationContext<'_>) -> bool {
        self.validators.iter().all(|v| v.validate(record, op, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_is_sorted_by_descending_priority() {
        let mut chain = ValidatorChain::new();
        chain.register(RecordValidator::Predicate(Arc::new(PredicateValidator::new())));
        chain.register(RecordValidator::Signed(SignedRecordValidator::new()));
        assert!(matches!(chain.validators[0], RecordValidator::Signed(_)));
        assert!(matches!(chain.validators[1], RecordValidator::Predicate(_)));
    }

    #[test]
    fn registering_same_kind_twice_collapses_to_one() {
        let mut chain = ValidatorChain::new();
        chain.register(RecordValidator::Signed(SignedRecordValidator::new()));
        chain.register(RecordValidator::Signed(SignedRecordValidator::new()));
        assert_eq!(chain.validators.len(), 1);
    }
}
