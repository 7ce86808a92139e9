// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! An in-process mock network: every [`ant_kad::Host`] implementation here
//! routes directly to another test node's [`ant_kad::KademliaHandle`]
//! rather than through real sockets, so these tests exercise the full
//! actor/lookup/RPC stack without a transport.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ant_kad::error::TransportError;
use ant_kad::protocol::WireMessage;
use ant_kad::{Behaviour, Config, ConnManager, Host, KademliaHandle, KeyBook, PeerAddrInfo, PeerLatencyMetrics, PeerStore, Stream};
use async_trait::async_trait;
use bytes::Bytes;
use libp2p_identity::{Keypair, PeerId, PublicKey};

/// Shared routing fabric for one test. By default every registered node
/// can dial every other; call [`Network::restrict`] to model a partial
/// mesh, and [`Network::block`] to make a peer permanently unreachable.
pub struct Network {
    handles: Mutex<HashMap<PeerId, KademliaHandle>>,
    edges: Mutex<HashSet<(PeerId, PeerId)>>,
    restricted: Mutex<bool>,
    blocked: Mutex<HashSet<PeerId>>,
}

impl Network {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            handles: Mutex::new(HashMap::new()),
            edges: Mutex::new(HashSet::new()),
            restricted: Mutex::new(false),
            blocked: Mutex::new(HashSet::new()),
        })
    }

    /// Once called, only pairs added via this method (in either
    /// direction) can dial each other.
    pub fn restrict(&self) {
        *self.restricted.lock().expect("lock poisoned") = true;
    }

    pub fn allow(&self, a: PeerId, b: PeerId) {
        let mut edges = self.edges.lock().expect("lock poisoned");
        edges.insert((a, b));
        edges.insert((b, a));
    }

    pub fn block(&self, peer: PeerId) {
        self.blocked.lock().expect("lock poisoned").insert(peer);
    }

    fn reachable(&self, from: PeerId, to: PeerId) -> bool {
        if self.blocked.lock().expect("lock poisoned").contains(&to) {
            return false;
        }
        if !*self.restricted.lock().expect("lock poisoned") {
            return true;
        }
        self.edges.lock().expect("lock poisoned").contains(&(from, to))
    }

    fn register(&self, peer: PeerId, handle: KademliaHandle) {
        self.handles.lock().expect("lock poisoned").insert(peer, handle);
    }

    fn lookup(&self, peer: &PeerId) -> Option<KademliaHandle> {
        self.handles.lock().expect("lock poisoned").get(peer).cloned()
    }
}

struct MockHost {
    id: PeerId,
    network: Arc<Network>,
}

#[async_trait]
impl Host for MockHost {
    fn id(&self) -> PeerId {
        self.id
    }

    async fn open_stream(&self, peer: PeerId, _protocol_ids: &[&str], _timeout: Duration) -> Result<Box<dyn Stream>, TransportError> {
        if !self.network.reachable(self.id, peer) {
            return Err(TransportError::ConnectionRefused);
        }
        let handle = self.network.lookup(&peer).ok_or(TransportError::ConnectionRefused)?;
        Ok(Box::new(MockStream {
            local: self.id,
            target: handle,
            pending: None,
        }))
    }
}

struct MockStream {
    local: PeerId,
    target: KademliaHandle,
    pending: Option<WireMessage>,
}

#[async_trait]
impl Stream for MockStream {
    async fn write(&mut self, bytes: Bytes) -> Result<(), TransportError> {
        let msg = WireMessage::decode(&bytes).map_err(|e| TransportError::Other(e.to_string()))?;
        self.pending = Some(msg);
        Ok(())
    }

    async fn read(&mut self) -> Result<Bytes, TransportError> {
        let request = self.pending.take().ok_or_else(|| TransportError::Other("read before write".into()))?;
        let response = self
            .target
            .handle_inbound(self.local, request)
            .await
            .map_err(|e| TransportError::Other(e.to_string()))?
            .ok_or_else(|| TransportError::Other("handler produced no response".into()))?;
        let bytes = response.encode().map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(Bytes::from(bytes))
    }

    async fn close(&mut self) {}
}

#[derive(Default)]
struct MockPeerStore {
    addrs: Mutex<HashMap<PeerId, PeerAddrInfo>>,
}

impl PeerStore for MockPeerStore {
    fn add_addrs(&self, peer: PeerId, addrs: Vec<Vec<u8>>, _ttl: Duration) {
        self.addrs.lock().expect("lock poisoned").entry(peer).or_default().addrs.extend(addrs);
    }

    fn get_peer(&self, peer: &PeerId) -> Option<PeerAddrInfo> {
        self.addrs.lock().expect("lock poisoned").get(peer).cloned()
    }
}

struct MockKeyBook {
    keys: Mutex<HashMap<PeerId, PublicKey>>,
}

impl KeyBook for MockKeyBook {
    fn pub_key(&self, peer: &PeerId) -> Option<PublicKey> {
        self.keys.lock().expect("lock poisoned").get(peer).cloned()
    }
}

impl MockKeyBook {
    fn register(&self, peer: PeerId, key: PublicKey) {
        self.keys.lock().expect("lock poisoned").insert(peer, key);
    }
}

struct MockConnManager;

impl ConnManager for MockConnManager {
    fn protect(&self, _peer: &PeerId, _tag: &str) {}
    fn unprotect(&self, _peer: &PeerId, _tag: &str) {}
}

struct MockLatency;

impl PeerLatencyMetrics for MockLatency {
    fn latency_ewma(&self, _peer: &PeerId) -> Option<Duration> {
        None
    }
}

/// A spawned test node: the running actor's handle plus enough identity
/// material to wire address books and bootstrap lists between nodes.
pub struct Node {
    pub id: PeerId,
    pub public_key: PublicKey,
    pub handle: KademliaHandle,
    key_book: Arc<MockKeyBook>,
}

/// Quick, quiet timeouts for tests: a real deployment's defaults would
/// make a failing-edge test take tens of seconds.
pub fn test_config() -> Config {
    let mut config = Config::new();
    config.network_timeout = Duration::from_millis(200);
    config.query_timeout = Duration::from_secs(5);
    config.max_retry_attempts = 2;
    config.retry_initial_backoff = Duration::from_millis(5);
    config.retry_max_backoff = Duration::from_millis(20);
    config.auto_refresh = false;
    config
}

pub async fn spawn_node(network: &Arc<Network>, config: Config) -> Node {
    spawn_node_with_keypair(network, config, Keypair::generate_ed25519()).await
}

/// Like [`spawn_node`], but with a caller-supplied keypair so the peer id
/// is known before spawning — needed to wire bootstrap lists that
/// reference a not-yet-spawned peer's id.
pub async fn spawn_node_with_keypair(network: &Arc<Network>, config: Config, keypair: Keypair) -> Node {
    let id = keypair.public().to_peer_id();
    let public_key = keypair.public();
    let host = Arc::new(MockHost { id, network: network.clone() });
    let peer_store = Arc::new(MockPeerStore::default());
    let key_book = Arc::new(MockKeyBook { keys: Mutex::new(HashMap::new()) });
    let conn_manager = Arc::new(MockConnManager);
    let latency = Arc::new(MockLatency);

    let (behaviour, handle) = Behaviour::new(keypair, host, key_book.clone(), peer_store, conn_manager, latency, config);
    network.register(id, handle.clone());
    tokio::spawn(behaviour.run());

    Node { id, public_key, handle, key_book }
}

/// Every node learns every other node's verification key, as if resolved
/// from an out-of-band directory (spec §6.2's `KeyBook` is explicitly not
/// responsible for key distribution).
pub fn cross_register_keys(nodes: &[Node]) {
    for node in nodes {
        for other in nodes {
            node.key_book.register(other.id, other.public_key.clone());
        }
    }
}

pub fn tracing_init() {
    let _ = tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).with_test_writer().try_init();
}
