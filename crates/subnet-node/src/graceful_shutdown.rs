//! Graceful shutdown & recovery.
//!
//! Coordinates clean node shutdown: stop accepting new epoch work, checkpoint
//! the consensus engine's in-flight commit-reveal state to disk, announce
//! offline status to the DHT, then stop.

use std::path::Path;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use subnet_core::EpochNumber;
use tracing::info;

/// Shutdown state for coordinating graceful shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Stopping,
    SavingState,
    NotifyingPeers,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Maximum time the shutdown sequence is allowed to take.
    pub max_shutdown_time: Duration,
    /// Whether to announce offline status to the DHT before exiting.
    pub notify_peers: bool,
    /// Directory checkpoints are written to.
    pub backup_dir: String,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            max_shutdown_time: Duration::from_secs(30),
            notify_peers: true,
            backup_dir: "state_backup".to_string(),
        }
    }
}

/// Consensus-engine state checkpointed across a restart. Lets a restarted
/// node avoid double-committing within an epoch it already committed in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownCheckpoint {
    /// Epoch the task-commit engine last committed a digest for, if any.
    pub latest_task_commit_epoch: Option<EpochNumber>,
    /// Epochs the scores-commit engine has an outstanding commit for.
    pub latest_scores_commit_epochs: Vec<EpochNumber>,
    /// Timestamp the checkpoint was written at.
    pub shutdown_time: u64,
    /// Node version, for diagnosing checkpoints from a prior release.
    pub node_version: String,
}

#[derive(Debug)]
pub struct ShutdownResult {
    pub success: bool,
    pub state: ShutdownState,
    pub checkpoint: Option<ShutdownCheckpoint>,
    pub errors: Vec<String>,
    pub duration: Duration,
}

/// Graceful shutdown manager. A stop event reaching this is the single
/// source of truth that work should wind down.
pub struct GracefulShutdown {
    config: ShutdownConfig,
    state: RwLock<ShutdownState>,
    shutdown_start: RwLock<Option<Instant>>,
    accepting_new_work: RwLock<bool>,
}

impl GracefulShutdown {
    pub fn new(config: ShutdownConfig) -> Self {
        Self {
            config,
            state: RwLock::new(ShutdownState::Running),
            shutdown_start: RwLock::new(None),
            accepting_new_work: RwLock::new(true),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.state.read() != ShutdownState::Running
    }

    pub fn is_accepting_new_work(&self) -> bool {
        *self.accepting_new_work.read()
    }

    pub fn get_state(&self) -> ShutdownState {
        *self.state.read()
    }

    /// Phase 1: stop accepting new epoch work.
    pub fn initiate_shutdown(&self) {
        info!("initiating graceful shutdown");
        *self.state.write() = ShutdownState::Stopping;
        *self.shutdown_start.write() = Some(Instant::now());
        *self.accepting_new_work.write() = false;
    }

    pub fn begin_state_save(&self) {
        info!("saving consensus engine checkpoint");
        *self.state.write() = ShutdownState::SavingState;
    }

    pub fn begin_peer_notification(&self) {
        info!("announcing offline status to peers");
        *self.state.write() = ShutdownState::NotifyingPeers;
    }

    pub fn complete_shutdown(&self) {
        info!("shutdown complete");
        *self.state.write() = ShutdownState::Stopped;
    }

    pub fn is_timeout_exceeded(&self) -> bool {
        match *self.shutdown_start.read() {
            Some(start) => start.elapsed() > self.config.max_shutdown_time,
            None => false,
        }
    }

    pub fn shutdown_duration(&self) -> Option<Duration> {
        self.shutdown_start.read().map(|s| s.elapsed())
    }

    pub fn save_checkpoint(&self, checkpoint: &ShutdownCheckpoint) -> Result<(), std::io::Error> {
        let backup_dir = Path::new(&self.config.backup_dir);
        if !backup_dir.exists() {
            std::fs::create_dir_all(backup_dir)?;
        }

        let checkpoint_path = backup_dir.join("shutdown_checkpoint.json");
        let json = serde_json::to_string_pretty(checkpoint)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

        std::fs::write(&checkpoint_path, json)?;
        info!(path = ?checkpoint_path, "saved shutdown checkpoint");
        Ok(())
    }

    pub fn load_checkpoint(&self) -> Result<Option<ShutdownCheckpoint>, std::io::Error> {
        let checkpoint_path = Path::new(&self.config.backup_dir).join("shutdown_checkpoint.json");

        if !checkpoint_path.exists() {
            return Ok(None);
        }

        let json = std::fs::read_to_string(&checkpoint_path)?;
        let checkpoint: ShutdownCheckpoint = serde_json::from_str(&json)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        info!(epoch = ?checkpoint.latest_task_commit_epoch, "loaded shutdown checkpoint");
        Ok(Some(checkpoint))
    }

    pub fn clear_checkpoint(&self) -> Result<(), std::io::Error> {
        let checkpoint_path = Path::new(&self.config.backup_dir).join("shutdown_checkpoint.json");

        if checkpoint_path.exists() {
            std::fs::remove_file(&checkpoint_path)?;
            info!("cleared stale shutdown checkpoint");
        }
        Ok(())
    }

    /// Runs the full shutdown sequence: stop, checkpoint, notify, stop.
    pub fn execute_shutdown_sync(
        &self,
        latest_task_commit_epoch: Option<EpochNumber>,
        latest_scores_commit_epochs: Vec<EpochNumber>,
    ) -> ShutdownResult {
        let start = Instant::now();
        let mut errors = Vec::new();

        self.initiate_shutdown();
        self.begin_state_save();

        let checkpoint = ShutdownCheckpoint {
            latest_task_commit_epoch,
            latest_scores_commit_epochs,
            shutdown_time: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            node_version: env!("CARGO_PKG_VERSION").to_string(),
        };

        if let Err(e) = self.save_checkpoint(&checkpoint) {
            errors.push(format!("failed to save checkpoint: {e}"));
        }

        if self.config.notify_peers {
            self.begin_peer_notification();
        }

        self.complete_shutdown();

        ShutdownResult {
            success: errors.is_empty(),
            state: *self.state.read(),
            checkpoint: Some(checkpoint),
            errors,
            duration: start.elapsed(),
        }
    }

    pub fn config(&self) -> &ShutdownConfig {
        &self.config
    }
}
