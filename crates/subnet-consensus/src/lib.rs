//! Subnet-local consensus: the Task Commit-Reveal Engine, its score
//! aggregation math, the per-epoch Consensus Loop that drives it against
//! the on-chain validator election, and the Heartbeat Announcer.

pub mod commit_reveal;
pub mod consensus_loop;
pub mod error;
pub mod heartbeat;
pub mod scoring;

pub use commit_reveal::{CommitRevealConfig, CommitRevealEngine};
pub use consensus_loop::{ConsensusLoop, ConsensusLoopConfig};
pub use error::{ConsensusError, Result};
pub use heartbeat::{HeartbeatAnnouncer, PeerPinger, MAX_PINGED};
