//! Heartbeat Announcer (§4.8): periodic liveness record under the shared
//! `node` DHT key, preceded by an RTT probe of a random sample of known
//! peers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use subnet_core::dht_keys::NODE_KEY;
use subnet_core::domain::NodeState;
use subnet_core::types::PeerId;
use subnet_crypto::PrivateKey;
use subnet_dht::client::{unix_now, DhtClient};
use subnet_dht::signed_validator::{owner_tag, sign_record_value};

/// How many currently-known peers get pinged before each announcement.
pub const MAX_PINGED: usize = 5;

/// Measures round-trip latency to a peer. Implemented over the RPC surface
/// by whoever wires the heartbeat announcer together; this crate only
/// consumes the result.
#[async_trait]
pub trait PeerPinger: Send + Sync {
    async fn ping(&self, peer: &PeerId) -> Option<f64>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HeartbeatData {
    state: NodeState,
    role: String,
    throughput: f64,
    public_name: String,
    version: String,
    using_relay: bool,
    next_pings: Vec<PeerId>,
}

pub struct HeartbeatAnnouncer {
    identity: PrivateKey,
    dht: Arc<dyn DhtClient>,
    pinger: Arc<dyn PeerPinger>,
    peer_id: PeerId,
    public_name: String,
    version: String,
    update_period: f64,
    max_pinged: usize,
    rtts: Mutex<HashMap<PeerId, f64>>,
}

impl HeartbeatAnnouncer {
    pub fn new(
        identity: PrivateKey,
        dht: Arc<dyn DhtClient>,
        pinger: Arc<dyn PeerPinger>,
        peer_id: PeerId,
        public_name: String,
        version: String,
        update_period: f64,
    ) -> Self {
        Self {
            identity,
            dht,
            pinger,
            peer_id,
            public_name,
            version,
            update_period,
            max_pinged: MAX_PINGED,
            rtts: Mutex::new(HashMap::new()),
        }
    }

    pub fn update_period(&self) -> f64 {
        self.update_period
    }

    pub fn cached_rtt(&self, peer: &PeerId) -> Option<f64> {
        self.rtts.lock().get(peer).copied()
    }

    /// Subkey ties the record to this node's identity: the peer id text
    /// plus an `[owner:]` tag the Signed Record Validator can check, so
    /// only this identity may ever overwrite its own entry.
    fn subkey(&self) -> String {
        format!("{}{}", self.peer_id.as_str(), owner_tag(&self.identity.get_public_key()))
    }

    async fn ping_sample(&self, known_peers: &[PeerId]) -> Vec<PeerId> {
        let mut rng = rand::thread_rng();
        let sample: Vec<PeerId> = known_peers
            .choose_multiple(&mut rng, self.max_pinged.min(known_peers.len()))
            .cloned()
            .collect();

        for peer in &sample {
            if let Some(rtt) = self.pinger.ping(peer).await {
                self.rtts.lock().insert(peer.clone(), rtt);
            }
        }
        sample
    }

    async fn publish(
        &self,
        state: NodeState,
        role: &str,
        throughput: f64,
        using_relay: bool,
        next_pings: Vec<PeerId>,
    ) -> bool {
        let data = HeartbeatData {
            state,
            role: role.to_string(),
            throughput,
            public_name: self.public_name.clone(),
            version: self.version.clone(),
            using_relay,
            next_pings,
        };
        let Ok(bytes) = serde_json::to_vec(&data) else { return false };

        let key = NODE_KEY;
        let subkey = self.subkey();
        let expiration = unix_now() + subnet_core::subnet_constants::max_heart_beat_time_secs();
        let signed = sign_record_value(key, &subkey, &bytes, expiration, &self.identity);
        self.dht.store(key, &subkey, signed, expiration, self.identity.get_public_key().to_bytes()).await
    }

    /// One announcement cycle: ping a fresh sample of known peers, then
    /// store the liveness record. Called on a `update_period`-second timer
    /// by whoever drives the node's cooperative task set.
    pub async fn announce_once(
        &self,
        known_peers: &[PeerId],
        role: &str,
        throughput: f64,
        using_relay: bool,
    ) -> bool {
        let pinged = self.ping_sample(known_peers).await;
        self.publish(NodeState::Online, role, throughput, using_relay, pinged).await
    }

    /// Published once on shutdown so peers stop counting this node as live
    /// without waiting for the heartbeat to simply expire.
    pub async fn announce_offline(&self) -> bool {
        self.publish(NodeState::Offline, "", 0.0, false, Vec::new()).await
    }
}
