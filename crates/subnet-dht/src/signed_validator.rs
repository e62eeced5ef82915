//! Ownership enforcement for DHT records whose key or subkey bytes carry an
//! `[owner:<pub>]` tag.
//!
//! An unprotected record (no owner tag anywhere in `key`/`subkey`) passes
//! unconditionally — this validator only ever rejects records that opted
//! into ownership by embedding the tag. Priority 10: it must run before any
//! validator that deserializes the value, since a forged value could
//! otherwise crash a deserializer before the signature is even checked.

use subnet_crypto::{load_public_key_from_bytes, PublicKey};

use crate::record::{DhtOp, DhtRecord};

const OWNER_PREFIX: &str = "[owner:";
const OWNER_SUFFIX: char = ']';
const SIGNATURE_PREFIX: &[u8] = b"[signature:";
const SIGNATURE_SUFFIX: u8 = b']';

pub const SIGNED_RECORD_VALIDATOR_PRIORITY: i32 = 10;

/// Extract every `[owner:<hex>]` tag's hex payload from a string. A string
/// with no tags returns an empty vec, which the caller treats as "this
/// field carries no ownership claim".
fn extract_owner_tags(s: &str) -> Vec<&str> {
    let mut tags = Vec::new();
    let mut rest = s;
    while let Some(start) = rest.find(OWNER_PREFIX) {
        let after_prefix = &rest[start + OWNER_PREFIX.len()..];
        match after_prefix.find(OWNER_SUFFIX) {
            Some(end) => {
                tags.push(&after_prefix[..end]);
                rest = &after_prefix[end + 1..];
            }
            None => break,
        }
    }
    tags
}

/// Split a value into `(stripped_value, signature_bytes)` if it carries
/// exactly one well-formed `[signature:<hex>]` suffix. Anything else —
/// zero signatures, more than one, or a malformed/non-suffix tag — is a
/// rejection, not an error: the caller just treats it as "not signed".
fn strip_signature(value: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
    let occurrences = value.windows(SIGNATURE_PREFIX.len()).filter(|w| *w == SIGNATURE_PREFIX).count();
    if occurrences != 1 {
        return None;
    }
    let start = value.windows(SIGNATURE_PREFIX.len()).position(|w| w == SIGNATURE_PREFIX)?;
    if value.last().copied() != Some(SIGNATURE_SUFFIX) {
        return None;
    }
    let hex_start = start + SIGNATURE_PREFIX.len();
    let hex_end = value.len() - 1;
    if hex_end < hex_start {
        return None;
    }
    let hex_str = std::str::from_utf8(&value[hex_start..hex_end]).ok()?;
    let sig = hex::decode(hex_str).ok()?;
    Some((value[..start].to_vec(), sig))
}

/// Pull the single owning public key out of a record's key and subkey, if
/// any tag is present. `Ambiguous` if key and subkey name two different
/// owners.
pub enum OwnerTag<'a> {
    None,
    Single(&'a str),
    Ambiguous,
}

pub fn resolve_owner_tag<'a>(key: &'a str, subkey: &'a str) -> OwnerTag<'a> {
    let mut tags: Vec<&str> = extract_owner_tags(key);
    tags.extend(extract_owner_tags(subkey));
    match tags.len() {
        0 => OwnerTag::None,
        _ if tags.iter().all(|t| *t == tags[0]) => OwnerTag::Single(tags[0]),
        _ => OwnerTag::Ambiguous,
    }
}

/// Validates ownership of `[owner:<pub>]`-tagged DHT records on both GET and
/// POST. Stateless — merging two instances just keeps one.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignedRecordValidator;

impl SignedRecordValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn priority(&self) -> i32 {
        SIGNED_RECORD_VALIDATOR_PRIORITY
    }

    pub fn merge_with(&self, _other: &Self) -> Self {
        Self
    }

    /// `true` if the record is allowed through; `false` otherwise. Applies
    /// identically to GET and POST — a record already stored under a forged
    /// signature would fail a GET the same way a forged POST would.
    pub fn validate(&self, record: &DhtRecord, _op: DhtOp) -> bool {
        let owner_hex = match resolve_owner_tag(&record.key, &record.subkey) {
            OwnerTag::None => return true,
            OwnerTag::Ambiguous => return false,
            OwnerTag::Single(hex) => hex,
        };

        let owner_bytes = match hex::decode(owner_hex) {
            Ok(b) => b,
            Err(_) => return false,
        };
        let public_key: PublicKey = match load_public_key_from_bytes(&owner_bytes) {
            Ok(pk) => pk,
            Err(_) => return false,
        };

        let (stripped_value, signature) = match strip_signature(&record.value) {
            Some(parts) => parts,
            None => return false,
        };

        let signed_bytes =
            DhtRecord::canonical_bytes(&record.key, &record.subkey, &stripped_value, record.expiration_time);
        public_key.verify(&signed_bytes, &signature)
    }
}

/// Sign a record's canonical bytes and append the `[signature:<hex>]` suffix
/// to its value, as the writer side of the contract this validator checks.
pub fn sign_record_value(
    key: &str,
    subkey: &str,
    value: &[u8],
    expiration_time: f64,
    signer: &subnet_crypto::PrivateKey,
) -> Vec<u8> {
    let signed_bytes = DhtRecord::canonical_bytes(key, subkey, value, expiration_time);
    let sig = signer.sign(&signed_bytes);
    let mut out = value.to_vec();
    out.extend_from_slice(SIGNATURE_PREFIX);
    out.extend_from_slice(hex::encode(sig).as_bytes());
    out.push(SIGNATURE_SUFFIX);
    out
}

pub fn owner_tag(public_key: &PublicKey) -> String {
    format!("{OWNER_PREFIX}{}]", hex::encode(public_key.to_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use subnet_crypto::PrivateKey;

    fn signed_record(owner: &PrivateKey, value: &[u8], expiration: f64) -> DhtRecord {
        let key = format!("protected_{}", owner_tag(&owner.get_public_key()));
        let value = sign_record_value(&key, "sub", value, expiration, owner);
        DhtRecord::new(key, "sub", value, expiration)
    }

    #[test]
    fn unprotected_record_passes_unconditionally() {
        let record = DhtRecord::new("node", "sub", b"anything".to_vec(), 100.0);
        assert!(SignedRecordValidator::new().validate(&record, DhtOp::Post));
    }

    #[test]
    fn round_trip_signed_record_validates() {
        let owner = PrivateKey::generate_ed25519();
        let record = signed_record(&owner, b"payload", 100.0);
        assert!(SignedRecordValidator::new().validate(&record, DhtOp::Post));
        assert!(SignedRecordValidator::new().validate(&record, DhtOp::Get));
    }

    #[test]
    fn tampered_value_is_rejected() {
        let owner = PrivateKey::generate_ed25519();
        let mut record = signed_record(&owner, b"payload", 100.0);
        // Flip a byte inside the value, before the signature suffix.
        record.value[0] ^= 0xff;
        assert!(!SignedRecordValidator::new().validate(&record, DhtOp::Post));
    }

    #[test]
    fn tampered_expiration_is_rejected() {
        let owner = PrivateKey::generate_ed25519();
        let mut record = signed_record(&owner, b"payload", 100.0);
        record.expiration_time = 200.0;
        assert!(!SignedRecordValidator::new().validate(&record, DhtOp::Post));
    }

    #[test]
    fn signature_from_different_key_is_rejected() {
        let owner = PrivateKey::generate_ed25519();
        let attacker = PrivateKey::generate_ed25519();
        let key = format!("protected_{}", owner_tag(&owner.get_public_key()));
        // Attacker signs over the genuine owner's key/subkey/value.
        let value = sign_record_value(&key, "sub", b"payload", 100.0, &attacker);
        let record = DhtRecord::new(key, "sub", value, 100.0);
        assert!(!SignedRecordValidator::new().validate(&record, DhtOp::Post));
    }

    #[test]
    fn two_different_owner_tags_are_rejected() {
        let owner_a = PrivateKey::generate_ed25519();
        let owner_b = PrivateKey::generate_ed25519();
        let key = format!("k_{}", owner_tag(&owner_a.get_public_key()));
        let subkey = format!("s_{}", owner_tag(&owner_b.get_public_key()));
        let value = sign_record_value(&key, &subkey, b"payload", 100.0, &owner_a);
        let record = DhtRecord::new(key, subkey, value, 100.0);
        assert!(!SignedRecordValidator::new().validate(&record, DhtOp::Post));
    }

    #[test]
    fn missing_signature_is_rejected() {
        let owner = PrivateKey::generate_ed25519();
        let key = format!("protected_{}", owner_tag(&owner.get_public_key()));
        let record = DhtRecord::new(key, "sub", b"unsigned".to_vec(), 100.0);
        assert!(!SignedRecordValidator::new().validate(&record, DhtOp::Post));
    }
}
