//! Layered configuration (§2a ambient stack): a `toml`-backed `Config`
//! loaded at startup and split into per-subsystem sections, mirroring the
//! teacher's `NodeConfig`/`ConsensusConfig`/`NetworkConfig`/`RpcConfig`/
//! `LoggingConfig` shape but carrying this runtime's own knobs.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use subnet_core::subnet_constants::{
    BLOCK_SECS, EPOCH_LENGTH, SCORES_REVEAL_DEADLINE, VERIFIER_COMMIT_DEADLINE, VERIFIER_REVEAL_DEADLINE,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub node: NodeConfig,
    pub consensus: ConsensusConfig,
    pub network: NetworkConfig,
    pub rpc: RpcConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Human-readable name announced in heartbeats.
    pub public_name: String,
    /// Path to the identity private key file. Generated on first start if absent.
    pub identity_key_path: PathBuf,
    /// `Ed25519` or `Rsa`.
    #[serde(default = "default_key_type")]
    pub key_type: String,
    pub subnet_id: u32,
}

fn default_key_type() -> String {
    "ed25519".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Seconds per block, as reported by the chain client.
    #[serde(default = "default_block_secs")]
    pub block_secs: u64,
    /// Blocks per epoch.
    #[serde(default = "default_epoch_length")]
    pub epoch_length: u64,
    /// `percent_complete` ceiling for task-commit.
    #[serde(default = "default_commit_deadline")]
    pub commit_deadline: f64,
    /// `percent_complete` ceiling for task-reveal.
    #[serde(default = "default_reveal_deadline")]
    pub reveal_deadline: f64,
    /// `percent_complete` ceiling for score-reveal; score-commit runs after it.
    #[serde(default = "default_scores_reveal_deadline")]
    pub scores_reveal_deadline: f64,
}

fn default_block_secs() -> u64 {
    BLOCK_SECS
}
fn default_epoch_length() -> u64 {
    EPOCH_LENGTH
}
fn default_commit_deadline() -> f64 {
    VERIFIER_COMMIT_DEADLINE
}
fn default_reveal_deadline() -> f64 {
    VERIFIER_REVEAL_DEADLINE
}
fn default_scores_reveal_deadline() -> f64 {
    SCORES_REVEAL_DEADLINE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Seconds between heartbeat announcements.
    pub update_period: f64,
    /// Cap on peers pinged per heartbeat cycle.
    #[serde(default = "default_max_pinged")]
    pub max_pinged: usize,
    /// Peers known at startup, before peer discovery populates the rest.
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
}

fn default_max_pinged() -> usize {
    subnet_consensus::MAX_PINGED
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub listen_addr: String,
    pub listen_port: u16,
    /// Bound on concurrently in-flight RPCs (§5 backpressure).
    #[serde(default = "default_max_parallel_rpc")]
    pub max_parallel_rpc: usize,
}

fn default_max_parallel_rpc() -> usize {
    32
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeConfig {
                public_name: "subnet-node".to_string(),
                identity_key_path: PathBuf::from("./node.key"),
                key_type: default_key_type(),
                subnet_id: 1,
            },
            consensus: ConsensusConfig {
                block_secs: default_block_secs(),
                epoch_length: default_epoch_length(),
                commit_deadline: default_commit_deadline(),
                reveal_deadline: default_reveal_deadline(),
                scores_reveal_deadline: default_scores_reveal_deadline(),
            },
            network: NetworkConfig {
                update_period: 30.0,
                max_pinged: default_max_pinged(),
                bootstrap_peers: Vec::new(),
            },
            rpc: RpcConfig {
                listen_addr: "0.0.0.0".to_string(),
                listen_port: 7777,
                max_parallel_rpc: default_max_parallel_rpc(),
            },
            logging: LoggingConfig { level: "info".to_string() },
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Fatal-config checks (§7 `FatalConfig`): anything wrong here means the
    /// process should refuse to start rather than limp along.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::NodeError;

        if self.consensus.block_secs == 0 {
            return Err(NodeError::FatalConfig("consensus.block_secs must be greater than 0".into()));
        }
        if self.consensus.epoch_length == 0 {
            return Err(NodeError::FatalConfig("consensus.epoch_length must be greater than 0".into()));
        }
        subnet_core::subnet_constants::assert_phase_ordering().map_err(NodeError::FatalConfig)?;
        if !(self.consensus.commit_deadline < self.consensus.reveal_deadline
            && self.consensus.reveal_deadline <= self.consensus.scores_reveal_deadline)
        {
            return Err(NodeError::FatalConfig(format!(
                "consensus phase deadlines must satisfy commit < reveal <= scores_reveal (got {}, {}, {})",
                self.consensus.commit_deadline, self.consensus.reveal_deadline, self.consensus.scores_reveal_deadline
            )));
        }
        if self.network.update_period <= 0.0 {
            return Err(NodeError::FatalConfig("network.update_period must be greater than 0".into()));
        }
        if self.rpc.listen_port == 0 {
            return Err(NodeError::FatalConfig("rpc.listen_port must not be 0".into()));
        }
        if self.rpc.max_parallel_rpc == 0 {
            return Err(NodeError::FatalConfig("rpc.max_parallel_rpc must be greater than 0".into()));
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(NodeError::FatalConfig(format!("invalid log level: {}", self.logging.level)));
        }
        match self.node.key_type.to_ascii_lowercase().as_str() {
            "ed25519" | "rsa" => {}
            other => {
                return Err(NodeError::FatalConfig(format!("invalid node.key_type: {other} (expected ed25519 or rsa)")))
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_epoch_length() {
        let mut config = Config::default();
        config.consensus.epoch_length = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_collapsed_phase_windows() {
        let mut config = Config::default();
        config.consensus.reveal_deadline = config.consensus.commit_deadline;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_key_type() {
        let mut config = Config::default();
        config.node.key_type = "secp256k1".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn round_trips_through_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config::default();
        config.to_file(path.to_str().unwrap()).unwrap();
        let loaded = Config::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.node.public_name, config.node.public_name);
        assert_eq!(loaded.rpc.listen_port, config.rpc.listen_port);
    }
}
