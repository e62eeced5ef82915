//! Commit-reveal timing constants.
//!
//! Values mirror the reference mock predicate validator: conservative
//! multi-epoch expirations so a slow DHT propagation does not silently drop
//! a commit or reveal before it can be read back.

pub const BLOCK_SECS: u64 = 3;
pub const EPOCH_LENGTH: u64 = 100;

/// Heartbeats may outlive at most 1.1 epochs.
pub const MAX_HEART_BEAT_TIME_EPOCHS: f64 = 1.1;
/// Commits and reveals are allowed up to 5 epochs of expiration headroom —
/// generous on purpose, since the predicate (not the expiration) is what
/// actually gates *when* a store is accepted.
pub const MAX_COMMIT_TIME_EPOCHS: f64 = 5.0;
pub const MAX_REVEAL_TIME_EPOCHS: f64 = 5.0;

/// `percent_complete` phase boundaries.
pub const VERIFIER_COMMIT_DEADLINE: f64 = 0.5;
pub const VERIFIER_REVEAL_DEADLINE: f64 = 0.6;
pub const SCORES_REVEAL_DEADLINE: f64 = 0.6;

/// Safety margin applied below a hard deadline when the engine itself picks
/// an expiration for a store, leaving headroom before the predicate
/// validator's ceiling would reject it outright.
pub const EXPIRATION_SAFETY_MARGIN: f64 = 0.9;

/// How many trailing epochs of per-peer store-quota bookkeeping to retain.
pub const MAX_EPOCH_HISTORY: u64 = 5;

/// Attestation ratio required before a validator's score reveals from
/// `epoch - 2` count toward aggregation.
pub const MIN_ATTESTATION_RATIO: f64 = 0.66;

pub fn max_heart_beat_time_secs() -> f64 {
    BLOCK_SECS as f64 * EPOCH_LENGTH as f64 * MAX_HEART_BEAT_TIME_EPOCHS
}

pub fn max_commit_time_secs() -> f64 {
    BLOCK_SECS as f64 * EPOCH_LENGTH as f64 * MAX_COMMIT_TIME_EPOCHS
}

pub fn max_reveal_time_secs() -> f64 {
    BLOCK_SECS as f64 * EPOCH_LENGTH as f64 * MAX_REVEAL_TIME_EPOCHS
}

/// Asserts the phase deadlines are strictly ordered so no phase window
/// collapses to zero width. Called once at startup (`Config::validate`).
pub fn assert_phase_ordering() -> Result<(), String> {
    if !(VERIFIER_COMMIT_DEADLINE < VERIFIER_REVEAL_DEADLINE) {
        return Err(format!(
            "verifier commit deadline {VERIFIER_COMMIT_DEADLINE} must be < reveal deadline {VERIFIER_REVEAL_DEADLINE}"
        ));
    }
    if !(VERIFIER_REVEAL_DEADLINE <= SCORES_REVEAL_DEADLINE) {
        return Err(format!(
            "verifier reveal deadline {VERIFIER_REVEAL_DEADLINE} must be <= scores reveal deadline {SCORES_REVEAL_DEADLINE}"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_ordering_holds_for_default_constants() {
        assert_phase_ordering().unwrap();
    }

    #[test]
    fn heart_beat_window_is_just_over_one_epoch() {
        let secs = max_heart_beat_time_secs();
        let one_epoch = BLOCK_SECS as f64 * EPOCH_LENGTH as f64;
        assert!(secs > one_epoch);
        assert!(secs < one_epoch * 2.0);
    }
}
