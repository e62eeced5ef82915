//! Pure epoch-clock derivation.
//!
//! No wall-clock dependence lives here: every field is derived from the
//! block height the chain client reports. `EpochData` is recomputed on
//! every scheduling decision rather than cached across blocks.

use serde::{Deserialize, Serialize};

use crate::types::{BlockHeight, EpochNumber};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochData {
    pub block: BlockHeight,
    pub epoch: EpochNumber,
    pub block_per_epoch: u64,
    pub seconds_per_epoch: u64,
    /// In `[0, 1)`.
    pub percent_complete: f64,
    pub blocks_elapsed: u64,
    pub blocks_remaining: u64,
    pub seconds_elapsed: u64,
    pub seconds_remaining: u64,
}

fn derive(block: BlockHeight, blocks_since_start: u64, epoch_length: u64, block_secs: u64) -> EpochData {
    let epoch = blocks_since_start / epoch_length;
    let blocks_elapsed = blocks_since_start % epoch_length;
    let blocks_remaining = epoch_length - blocks_elapsed;
    let seconds_per_epoch = epoch_length * block_secs;

    EpochData {
        block,
        epoch,
        block_per_epoch: epoch_length,
        seconds_per_epoch,
        percent_complete: blocks_elapsed as f64 / epoch_length as f64,
        blocks_elapsed,
        blocks_remaining,
        seconds_elapsed: blocks_elapsed * block_secs,
        seconds_remaining: blocks_remaining * block_secs,
    }
}

/// Network-wide epoch clock: `epoch = block / epoch_length`.
pub fn epoch_data_network(block: BlockHeight, epoch_length: u64, block_secs: u64) -> EpochData {
    derive(block, block, epoch_length, block_secs)
}

/// Subnet-local epoch clock: `epoch = (block − slot) / epoch_length`.
///
/// `slot` is the subnet's phase offset relative to the network clock; a
/// subnet registered mid-epoch does not start its own clock at zero until
/// its slot is reached.
pub fn epoch_data_subnet(
    block: BlockHeight,
    slot: BlockHeight,
    epoch_length: u64,
    block_secs: u64,
) -> EpochData {
    let blocks_since_start = block.saturating_sub(slot);
    derive(block, blocks_since_start, epoch_length, block_secs)
}

/// Shared access to the subnet-local epoch clock. Every scheduler
/// (predicate validator, commit-reveal engine, consensus loop, heartbeat
/// announcer) reads the same clock so they can never disagree about which
/// epoch or phase is current.
pub trait EpochClock: Send + Sync {
    fn current(&self) -> EpochData;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_epoch_divides_cleanly() {
        let e = epoch_data_network(250, 100, 3);
        assert_eq!(e.epoch, 2);
        assert_eq!(e.blocks_elapsed, 50);
        assert!((e.percent_complete - 0.5).abs() < 1e-9);
    }

    #[test]
    fn subnet_epoch_accounts_for_slot_offset() {
        // Subnet registered at block 40; at block 240 it has seen 200 blocks.
        let e = epoch_data_subnet(240, 40, 100, 3);
        assert_eq!(e.epoch, 2);
        assert_eq!(e.blocks_elapsed, 0);
        assert_eq!(e.percent_complete, 0.0);
    }

    #[test]
    fn elapsed_and_remaining_sum_to_epoch_length() {
        let e = epoch_data_network(317, 100, 2);
        assert_eq!(e.blocks_elapsed + e.blocks_remaining, e.block_per_epoch);
        assert_eq!(e.seconds_elapsed + e.seconds_remaining, e.seconds_per_epoch);
    }

    #[test]
    fn block_before_slot_saturates_to_epoch_zero() {
        let e = epoch_data_subnet(10, 40, 100, 3);
        assert_eq!(e.epoch, 0);
        assert_eq!(e.blocks_elapsed, 0);
    }
}
