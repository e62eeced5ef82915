//! Timed nonce set used for replay defense.
//!
//! "Seen?" and "insert" happen inside a single lock acquisition, which is
//! what the design notes mean by a lock-free TOCTOU freeze window — there
//! is no gap between checking and recording a nonce where a racing request
//! could slip through with the same bytes.

use std::collections::HashMap;

use parking_lot::Mutex;

pub struct NonceStore {
    seen: Mutex<HashMap<[u8; 8], f64>>,
    window_secs: f64,
}

impl NonceStore {
    pub fn new(window_secs: f64) -> Self {
        Self { seen: Mutex::new(HashMap::new()), window_secs }
    }

    /// `true` if this is the first time `nonce` has been seen within the
    /// replay window (and it is now recorded); `false` if it is a replay.
    pub fn check_and_insert(&self, nonce: [u8; 8], now: f64) -> bool {
        let mut seen = self.seen.lock();
        seen.retain(|_, t| now - *t <= self.window_secs);
        if seen.contains_key(&nonce) {
            return false;
        }
        seen.insert(nonce, now);
        true
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_within_window_is_rejected_then_accepted_after_expiry() {
        let store = NonceStore::new(180.0);
        let nonce = [1u8; 8];
        assert!(store.check_and_insert(nonce, 1000.0));
        assert!(!store.check_and_insert(nonce, 1010.0));
        assert!(store.check_and_insert(nonce, 1000.0 + 180.1));
    }

    #[test]
    fn distinct_nonces_never_collide() {
        let store = NonceStore::new(180.0);
        assert!(store.check_and_insert([1u8; 8], 0.0));
        assert!(store.check_and_insert([2u8; 8], 0.0));
    }
}
