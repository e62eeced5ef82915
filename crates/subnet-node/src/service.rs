//! Node service: wires the epoch clock, DHT record layer, commit-reveal
//! engine, consensus loop, heartbeat announcer, and authenticated RPC
//! surface together, and drives the Module Lifecycle state machine
//! (Joining -> Online -> Offline) around a single stop event.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use subnet_chain::mock::MockChainClient;
use subnet_chain::ChainClient;
use subnet_consensus::{
    CommitRevealConfig, CommitRevealEngine, ConsensusLoop, ConsensusLoopConfig, HeartbeatAnnouncer, PeerPinger,
};
use subnet_core::domain::{Classification, MathData, NodeState};
use subnet_core::epoch::{EpochClock, EpochData};
use subnet_core::types::PeerId;
use subnet_dht::client::InMemoryDht;
use subnet_dht::predicate_validator::PredicateValidator;
use subnet_dht::signed_validator::SignedRecordValidator;
use subnet_dht::validator::{RecordValidator, ValidatorChain};
use subnet_rpc::surface::ClientMode;
use subnet_rpc::{PosAuthorizer, RpcAuthWrapper, SignatureAuthorizer};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::graceful_shutdown::{GracefulShutdown, ShutdownConfig};
use crate::identity;
use crate::rpc_server::{run_loopback_round, LocalNodeSurface};

/// A peer liveness probe backed by the authenticated RPC surface. No real
/// peer-to-peer transport is wired up here — the wire bytes and connection
/// handling for `rpc_info`/`rpc_math`/`rpc_inference_stream` are a black box
/// outside this crate, same as the DHT's Kademlia transport. This stand-in
/// always reports "no answer", which degrades the heartbeat's RTT sampling
/// to a no-op without breaking the announce cycle around it.
struct UnreachablePinger;

#[async_trait]
impl PeerPinger for UnreachablePinger {
    async fn ping(&self, _peer: &PeerId) -> Option<f64> {
        None
    }
}

/// Caches the subnet-local epoch clock, refreshed by polling the chain
/// client on a timer. Every scheduler in the node reads through this same
/// cache so they never disagree about the current epoch or phase.
struct CachedClock {
    cached: RwLock<EpochData>,
}

impl CachedClock {
    fn new(initial: EpochData) -> Self {
        Self { cached: RwLock::new(initial) }
    }

    fn set(&self, data: EpochData) {
        *self.cached.write() = data;
    }
}

impl EpochClock for CachedClock {
    fn current(&self) -> EpochData {
        *self.cached.read()
    }
}

/// Orchestrates every subsystem for one running node.
pub struct NodeService {
    config: Config,
    peer_id: PeerId,
    chain: Arc<dyn ChainClient>,
    clock: Arc<CachedClock>,
    engine: Arc<CommitRevealEngine>,
    consensus_loop: Arc<ConsensusLoop>,
    heartbeat: Arc<HeartbeatAnnouncer>,
    rpc_wrapper: Arc<RpcAuthWrapper>,
    rpc_surface: Arc<LocalNodeSurface>,
    state: Mutex<NodeState>,
    shutdown: GracefulShutdown,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl NodeService {
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        info!(public_name = %config.node.public_name, subnet_id = config.node.subnet_id, "initializing node");

        let identity_for_heartbeat = identity::load_or_generate(&config.node.identity_key_path, &config.node.key_type)?;
        let identity_for_engine = identity::load_or_generate(&config.node.identity_key_path, &config.node.key_type)?;
        let identity_for_signing = identity::load_or_generate(&config.node.identity_key_path, &config.node.key_type)?;
        let public_key_bytes = identity_for_heartbeat.get_public_key().to_bytes();
        let peer_id = identity::derive_peer_id(&public_key_bytes);

        // Real blockchain transport (RPC formats, SCALE encoding) is out of
        // scope; this is the stand-in single-process harness, same one the
        // crate's own tests drive against.
        let chain: Arc<dyn ChainClient> =
            Arc::new(MockChainClient::new(config.consensus.epoch_length, config.consensus.block_secs));

        let initial_epoch = chain.get_subnet_epoch_data(0).await.unwrap_or(EpochData {
            block: 0,
            epoch: 0,
            block_per_epoch: config.consensus.epoch_length,
            seconds_per_epoch: config.consensus.epoch_length * config.consensus.block_secs,
            percent_complete: 0.0,
            blocks_elapsed: 0,
            blocks_remaining: config.consensus.epoch_length,
            seconds_elapsed: 0,
            seconds_remaining: config.consensus.epoch_length * config.consensus.block_secs,
        });
        let clock = Arc::new(CachedClock::new(initial_epoch));

        let mut validators = ValidatorChain::new();
        validators.register(RecordValidator::Signed(SignedRecordValidator::new()));
        validators.register(RecordValidator::Predicate(Arc::new(PredicateValidator::new())));
        let dht = Arc::new(InMemoryDht::new(validators, clock.clone()));

        let commit_reveal_config = CommitRevealConfig {
            commit_deadline: config.consensus.commit_deadline,
            reveal_deadline: config.consensus.reveal_deadline,
            scores_reveal_deadline: config.consensus.scores_reveal_deadline,
        };
        let engine = Arc::new(CommitRevealEngine::new(identity_for_engine, dht.clone(), commit_reveal_config)?);

        let consensus_loop = Arc::new(ConsensusLoop::new(
            chain.clone(),
            engine.clone(),
            clock.clone(),
            ConsensusLoopConfig {
                subnet_id: config.node.subnet_id,
                self_subnet_node_id: config.node.subnet_id,
                block_secs: config.consensus.block_secs,
            },
        ));

        let heartbeat = Arc::new(HeartbeatAnnouncer::new(
            identity_for_heartbeat,
            dht.clone(),
            Arc::new(UnreachablePinger),
            peer_id.clone(),
            config.node.public_name.clone(),
            env!("CARGO_PKG_VERSION").to_string(),
            config.network.update_period,
        ));

        let signature_authorizer = SignatureAuthorizer::new(identity_for_signing, config.node.public_name.clone());
        let pos_authorizer = Arc::new(PosAuthorizer::new(signature_authorizer, chain.clone(), config.node.subnet_id));
        let rpc_wrapper = Arc::new(RpcAuthWrapper::new(pos_authorizer));
        let rpc_surface = Arc::new(LocalNodeSurface::new(
            rpc_wrapper.clone(),
            "miner".to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
            ClientMode::Miner,
        ));

        let (stop_tx, stop_rx) = watch::channel(false);

        Ok(Self {
            config,
            peer_id,
            chain,
            clock,
            engine,
            consensus_loop,
            heartbeat,
            rpc_wrapper,
            rpc_surface,
            state: Mutex::new(NodeState::Joining),
            shutdown: GracefulShutdown::new(ShutdownConfig::default()),
            stop_tx,
            stop_rx,
        })
    }

    pub fn state(&self) -> NodeState {
        *self.state.lock()
    }

    /// Starts the cooperative background tasks: epoch-clock refresh,
    /// heartbeat announcements, the authenticated RPC auth loopback, and
    /// the per-epoch consensus loop. Returns once every task is spawned;
    /// `wait_for_shutdown` blocks until a stop signal tears them back down.
    pub async fn start(&mut self) -> Result<()> {
        info!(peer_id = %self.peer_id, "starting node services");

        let mut stop = self.stop_rx.clone();
        let chain = self.chain.clone();
        let clock = self.clock.clone();
        let block_secs = self.config.consensus.block_secs.max(1);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(block_secs));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Ok(data) = chain.get_subnet_epoch_data(0).await {
                            clock.set(data);
                        }
                    }
                    _ = stop.changed() => {
                        if *stop.borrow() { break; }
                    }
                }
            }
        });

        let mut stop = self.stop_rx.clone();
        let heartbeat = self.heartbeat.clone();
        let update_period = self.heartbeat.update_period();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs_f64(update_period.max(1.0)));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if !heartbeat.announce_once(&[], "miner", 0.0, false).await {
                            warn!("heartbeat announcement failed to store");
                        }
                    }
                    _ = stop.changed() => {
                        if *stop.borrow() { break; }
                    }
                }
            }
        });

        // The authenticated RPC server task (§5's second of the two
        // documented tasks, alongside the consensus loop above). No wire
        // transport is plugged in yet, so this drives a loopback round
        // trip through the same `RpcAuthWrapper`/`LocalNodeSurface` stack a
        // real listener would use, keeping the auth stack live instead of
        // parked.
        let mut stop = self.stop_rx.clone();
        let rpc_wrapper = self.rpc_wrapper.clone();
        let rpc_surface = self.rpc_surface.clone();
        let rpc_period = self.config.network.update_period.max(1.0);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs_f64(rpc_period));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match run_loopback_round(&rpc_wrapper, &rpc_surface).await {
                            Ok(data) => debug!(role = %data.role, "rpc auth wrapper loopback round ok"),
                            Err(e) => debug!(error = %e, "rpc auth wrapper loopback round rejected"),
                        }
                    }
                    _ = stop.changed() => {
                        if *stop.borrow() { break; }
                    }
                }
            }
        });

        let mut stop = self.stop_rx.clone();
        let consensus_loop = self.consensus_loop.clone();
        tokio::spawn(async move {
            if !consensus_loop.wait_until_subnet_active(&mut stop).await {
                info!("subnet never became active, consensus loop exiting");
                return;
            }
            if !consensus_loop.wait_until_locally_ready(&mut stop).await {
                info!("node never reached Idle classification, consensus loop exiting");
                return;
            }
            loop {
                if *stop.borrow() {
                    break;
                }
                let math_data: Vec<MathData> = Vec::new();
                if let Err(e) = consensus_loop.run_epoch(math_data, &HashMap::new(), &mut stop).await {
                    error!(error = %e, "consensus loop epoch failed, resuming after one block");
                }
                if !Self::sleep_one_block(&mut stop, std::time::Duration::from_secs(1)).await {
                    break;
                }
            }
        });

        *self.state.lock() = NodeState::Online;
        info!("node is online");
        Ok(())
    }

    async fn sleep_one_block(stop: &mut watch::Receiver<bool>, dur: std::time::Duration) -> bool {
        if *stop.borrow() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(dur) => true,
            changed = stop.changed() => changed.is_err() || !*stop.borrow(),
        }
    }

    /// Blocks until Ctrl+C or an externally triggered stop, then runs the
    /// graceful shutdown sequence.
    pub async fn wait_for_shutdown(&mut self) -> Result<()> {
        info!("node is running, press Ctrl+C to stop");
        tokio::signal::ctrl_c().await?;
        info!("shutdown signal received");
        self.shutdown().await
    }

    async fn shutdown(&mut self) -> Result<()> {
        let _ = self.stop_tx.send(true);
        *self.state.lock() = NodeState::Offline;

        if !self.heartbeat.announce_offline().await {
            warn!("failed to announce offline status before shutdown");
        }

        let result = self
            .shutdown
            .execute_shutdown_sync(self.engine.latest_task_commit_epoch(), self.engine.latest_scores_commit_epochs());

        if !result.success {
            for err in &result.errors {
                error!(error = %err, "error during shutdown");
            }
        }
        Ok(())
    }

    pub fn classification_hint(&self) -> Classification {
        Classification::Idle
    }
}
