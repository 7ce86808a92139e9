// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The top-level orchestrator: a single actor owning the routing table,
//! stores and query state, driven by commands from cloneable
//! [`KademliaHandle`]s. One `Behaviour` per DHT instance; instances never
//! share mutable state (spec §5).

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use libp2p_identity::{Keypair, PeerId};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::KadError;
use crate::handler::{self, HandlerContext};
use crate::host::{ConnManager, Host, LatencyGate, PeerAddrInfo, PeerLatencyMetrics, PeerStore};
use crate::jobs;
use crate::kbucket::{Table, TableConfig};
use crate::key::Key;
use crate::metrics::KadMetrics;
use crate::protocol::{ConnectionType, MessageType, WireMessage};
use crate::query::{Lookup, LookupConfig, Termination};
use crate::record::{MemoryProviderStore, MemoryStore, ProviderStore, Record, RecordStore};
use crate::validator::NamespacedValidator;

/// TTL applied to addresses learned for a peer discovered during a
/// lookup; the spec gives no explicit default for this case (only for
/// provider addresses and the v2 observed-address policy), so this
/// crate picks a conservative half-hour.
const DISCOVERED_PEER_ADDR_TTL: Duration = Duration::from_secs(30 * 60);

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

enum Command {
    FindPeer { peer: PeerId, reply: oneshot::Sender<Result<Option<PeerAddrInfo>, KadError>> },
    GetClosestPeers { target: Vec<u8>, reply: oneshot::Sender<Result<Vec<PeerId>, KadError>> },
    GetValue { key: Vec<u8>, reply: oneshot::Sender<Result<Vec<u8>, KadError>> },
    PutValue { key: Vec<u8>, value: Vec<u8>, reply: oneshot::Sender<Result<(), KadError>> },
    Provide { content_key: Vec<u8>, announce: bool, reply: oneshot::Sender<Result<(), KadError>> },
    FindProviders { content_key: Vec<u8>, max: usize, reply: oneshot::Sender<Result<Vec<PeerId>, KadError>> },
    Bootstrap { reply: oneshot::Sender<Result<(), KadError>> },
    HandleInbound { sender: PeerId, request: WireMessage, reply: oneshot::Sender<Result<Option<WireMessage>, KadError>> },
    LocalGet { key: Vec<u8>, reply: oneshot::Sender<Option<Vec<u8>>> },
    LocalHas { key: Vec<u8>, reply: oneshot::Sender<bool> },
    LocalRemove { key: Vec<u8> },
    LocalKeys { reply: oneshot::Sender<Vec<Vec<u8>>> },
    Close { reply: oneshot::Sender<()> },
}

/// Cloneable handle to a running [`Behaviour`] actor; this is the public
/// surface described in spec §6.3.
#[derive(Clone)]
pub struct KademliaHandle {
    tx: mpsc::Sender<Command>,
}

impl KademliaHandle {
    async fn call<T>(&self, f: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, KadError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(f(reply_tx)).await.map_err(|_| KadError::Closed)?;
        reply_rx.await.map_err(|_| KadError::Closed)
    }

    pub async fn find_peer(&self, peer: PeerId) -> Result<Option<PeerAddrInfo>, KadError> {
        self.call(|reply| Command::FindPeer { peer, reply }).await?
    }

    pub async fn get_closest_peers(&self, target: Vec<u8>) -> Result<Vec<PeerId>, KadError> {
        self.call(|reply| Command::GetClosestPeers { target, reply }).await?
    }

    pub async fn get_value(&self, key: Vec<u8>) -> Result<Vec<u8>, KadError> {
        self.call(|reply| Command::GetValue { key, reply }).await?
    }

    pub async fn put_value(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), KadError> {
        self.call(|reply| Command::PutValue { key, value, reply }).await?
    }

    pub async fn provide(&self, content_key: Vec<u8>, announce: bool) -> Result<(), KadError> {
        self.call(|reply| Command::Provide { content_key, announce, reply }).await?
    }

    pub async fn find_providers(&self, content_key: Vec<u8>, max: usize) -> Result<Vec<PeerId>, KadError> {
        self.call(|reply| Command::FindProviders { content_key, max, reply }).await?
    }

    pub async fn bootstrap(&self) -> Result<(), KadError> {
        self.call(|reply| Command::Bootstrap { reply }).await?
    }

    /// Feed an inbound request byte blob (already read off a stream by
    /// the host) into the RPC state machine.
    pub async fn handle_inbound(&self, sender: PeerId, request: WireMessage) -> Result<Option<WireMessage>, KadError> {
        self.call(|reply| Command::HandleInbound { sender, request, reply }).await?
    }

    pub async fn get(&self, key: Vec<u8>) -> Option<Vec<u8>> {
        self.call(|reply| Command::LocalGet { key, reply }).await.unwrap_or(None)
    }

    pub async fn has(&self, key: Vec<u8>) -> bool {
        self.call(|reply| Command::LocalHas { key, reply }).await.unwrap_or(false)
    }

    pub async fn remove(&self, key: Vec<u8>) -> Result<(), KadError> {
        self.tx.send(Command::LocalRemove { key }).await.map_err(|_| KadError::Closed)
    }

    pub async fn keys(&self) -> Vec<Vec<u8>> {
        self.call(|reply| Command::LocalKeys { reply }).await.unwrap_or_default()
    }

    pub async fn close(&self) -> Result<(), KadError> {
        self.call(|reply| Command::Close { reply }).await
    }
}

/// The DHT actor. Construct with [`Behaviour::new`] and drive it with
/// [`Behaviour::run`] on a spawned task; interact through the returned
/// [`KademliaHandle`].
pub struct Behaviour {
    keypair: Keypair,
    local_id: PeerId,
    host: Arc<dyn Host>,
    key_book: Arc<dyn crate::host::KeyBook>,
    peer_store: Arc<dyn PeerStore>,
    conn_manager: Arc<dyn ConnManager>,
    latency: Arc<dyn PeerLatencyMetrics>,
    table: Table,
    records: Box<dyn RecordStore>,
    providers: MemoryProviderStore,
    validator: NamespacedValidator,
    config: Config,
    metrics: Arc<KadMetrics>,
    command_rx: mpsc::Receiver<Command>,
}

impl Behaviour {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        keypair: Keypair,
        host: Arc<dyn Host>,
        key_book: Arc<dyn crate::host::KeyBook>,
        peer_store: Arc<dyn PeerStore>,
        conn_manager: Arc<dyn ConnManager>,
        latency: Arc<dyn PeerLatencyMetrics>,
        config: Config,
    ) -> (Self, KademliaHandle) {
        let local_id = keypair.public().to_peer_id();
        let table_config = TableConfig {
            bucket_size: config.bucket_size,
            usefulness_grace_period: config.usefulness_grace_period,
        };
        let validator = NamespacedValidator::new(config.max_record_age);
        let (tx, command_rx) = mpsc::channel(128);
        let behaviour = Self {
            keypair,
            local_id,
            host,
            key_book,
            peer_store,
            conn_manager,
            latency,
            table: Table::new(local_id, table_config),
            records: Box::new(MemoryStore::new()),
            providers: MemoryProviderStore::new(),
            validator,
            config,
            metrics: Arc::new(KadMetrics::new()),
            command_rx,
        };
        (behaviour, KademliaHandle { tx })
    }

    pub fn metrics(&self) -> Arc<KadMetrics> {
        self.metrics.clone()
    }

    /// Build a [`crate::kbucket::EvictionGate`] from just the
    /// `latency`/`config` fields,
    /// as a disjoint partial borrow: callers that also need `&mut
    /// self.table` alongside the gate cannot go through a `&self` method,
    /// since that would borrow all of `self`.
    fn build_gate(latency: &dyn PeerLatencyMetrics, max_latency: Duration) -> LatencyGate<'_> {
        LatencyGate { metrics: latency, max_latency }
    }

    /// Drive the actor until the command channel closes or `close()` is
    /// called. One `Behaviour` per spawned task.
    pub async fn run(mut self) {
        let mut refresh_timer = tokio::time::interval(self.config.refresh_interval);
        refresh_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(Command::Close { reply }) => {
                            let _ = reply.send(());
                            break;
                        }
                        Some(cmd) => self.handle_command(cmd).await,
                        None => break,
                    }
                }
                _ = refresh_timer.tick(), if self.config.auto_refresh => {
                    if let Err(e) = self.refresh(&[]).await {
                        warn!(error = %e, "periodic refresh failed");
                    }
                }
            }
        }
        info!(peer = %self.local_id, "kademlia actor stopped");
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Close { .. } => unreachable!("handled in run()"),
            Command::FindPeer { peer, reply } => {
                let _ = reply.send(self.find_peer(peer).await);
            }
            Command::GetClosestPeers { target, reply } => {
                let _ = reply.send(self.get_closest_peers(target).await);
            }
            Command::GetValue { key, reply } => {
                let _ = reply.send(self.get_value(key).await);
            }
            Command::PutValue { key, value, reply } => {
                let _ = reply.send(self.put_value(key, value).await);
            }
            Command::Provide { content_key, announce, reply } => {
                let _ = reply.send(self.provide(content_key, announce).await);
            }
            Command::FindProviders { content_key, max, reply } => {
                let _ = reply.send(self.find_providers(content_key, max).await);
            }
            Command::Bootstrap { reply } => {
                let _ = reply.send(self.bootstrap().await);
            }
            Command::HandleInbound { sender, request, reply } => {
                let result = self.handle_inbound(sender, request).map_err(KadError::from);
                let _ = reply.send(result);
            }
            Command::LocalGet { key, reply } => {
                let _ = reply.send(self.records.get(&key).map(|r| r.value.clone()));
            }
            Command::LocalHas { key, reply } => {
                let _ = reply.send(self.records.has(&key));
            }
            Command::LocalRemove { key } => {
                self.records.delete(&key);
            }
            Command::LocalKeys { reply } => {
                let _ = reply.send(self.records.keys());
            }
        }
    }

    fn handle_inbound(&mut self, sender: PeerId, request: WireMessage) -> Result<Option<WireMessage>, crate::error::ProtocolError> {
        let gate = Self::build_gate(self.latency.as_ref(), self.config.max_latency);
        let now = now_ms();
        let keys = crate::host::KeyBookAsPublicKeySource(self.key_book.as_ref());
        let mut ctx = HandlerContext {
            local_id: self.local_id,
            table: &mut self.table,
            gate: &gate,
            records: self.records.as_mut(),
            providers: &mut self.providers,
            peer_store: self.peer_store.as_ref(),
            validator: &self.validator,
            keys: &keys,
            config: &self.config,
            now_ms: now,
        };
        handler::handle_request(&mut ctx, sender, request)
    }

    /// Remove every peer the lookup marked `Unreachable` (spec §4.5:
    /// "post-lookup routing-table maintenance").
    fn evict_unreachable(&mut self, lookup: &Lookup) {
        for peer in lookup.unreachable_peers() {
            if self.table.remove(&peer) {
                self.conn_manager.unprotect(&peer, "kad-routing");
                self.metrics.routing_table_evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn record_discovered_peers(&mut self, msg: &WireMessage) -> Vec<PeerId> {
        let gate = Self::build_gate(self.latency.as_ref(), self.config.max_latency);
        let mut found = Vec::with_capacity(msg.closer_peers.len());
        for peer in &msg.closer_peers {
            let Ok(peer_id) = PeerId::from_bytes(&peer.id) else { continue };
            if peer_id == self.local_id {
                continue;
            }
            if !peer.addrs.is_empty() {
                self.peer_store.add_addrs(peer_id, peer.addrs.clone(), DISCOVERED_PEER_ADDR_TTL);
            }
            self.table.try_add(peer_id, true, true, &gate);
            found.push(peer_id);
        }
        found
    }

    /// Run one iterative lookup. `make_message` builds the outgoing
    /// request for a given target-key byte slice; `on_response` lets the
    /// caller harvest type-specific payload (a record, provider peers) as
    /// responses arrive.
    async fn run_lookup(
        &mut self,
        target: Key,
        make_message: impl Fn(&[u8]) -> WireMessage,
        mut stop_fn: impl FnMut(&Lookup) -> bool,
        mut on_response: impl FnMut(&mut Self, PeerId, &WireMessage),
    ) -> Lookup {
        self.metrics.lookups_started.fetch_add(1, Ordering::Relaxed);
        let seed = {
            let nearest = self.table.nearest(&target, self.config.bucket_size);
            if nearest.is_empty() {
                self.config.bootstrap_peers.clone()
            } else {
                nearest
            }
        };
        let lookup_config = LookupConfig {
            alpha: self.config.concurrency,
            resiliency: self.config.resiliency,
            overall_timeout: self.config.query_timeout,
        };
        let mut lookup = Lookup::new(target.clone(), seed, lookup_config);
        let mut in_flight: JoinSet<(PeerId, Result<Option<WireMessage>, KadError>)> = JoinSet::new();
        let target_bytes = target.as_bytes().to_vec();

        loop {
            if let Some(term) = lookup.check_termination(|l| stop_fn(l)) {
                match term {
                    Termination::Success => self.metrics.lookups_succeeded.fetch_add(1, Ordering::Relaxed),
                    Termination::Timeout => self.metrics.lookups_timed_out.fetch_add(1, Ordering::Relaxed),
                    Termination::Cancelled => self.metrics.lookups_cancelled.fetch_add(1, Ordering::Relaxed),
                    Termination::NoMorePeers => 0,
                };
                break;
            }

            for peer in lookup.next_batch() {
                let host = self.host.clone();
                let msg = make_message(&target_bytes);
                let config = self.config.clone();
                self.metrics.rpcs_sent.fetch_add(1, Ordering::Relaxed);
                in_flight.spawn(async move {
                    let result = handler::send_with_retry(host.as_ref(), peer, &msg, &config).await;
                    (peer, result)
                });
            }

            if in_flight.is_empty() {
                // Nothing queued and nothing outstanding; `check_termination`
                // will classify this as `NoMorePeers` on the next loop.
                continue;
            }

            let Some(joined) = in_flight.join_next().await else {
                continue;
            };
            let Ok((peer, result)) = joined else {
                continue;
            };
            match result {
                Ok(response) => {
                    if let Some(ref msg) = response {
                        let discovered = self.record_discovered_peers(msg);
                        lookup.on_success(&peer, discovered);
                        on_response(self, peer, msg);
                    } else {
                        lookup.on_success(&peer, Vec::new());
                    }
                }
                Err(e) => {
                    self.metrics.rpcs_failed.fetch_add(1, Ordering::Relaxed);
                    let cause = match e {
                        KadError::Transport(t) => t,
                        KadError::MaxRetriesExceeded { cause, .. } => cause,
                        other => crate::error::TransportError::Other(other.to_string()),
                    };
                    lookup.on_failure(&peer, cause);
                }
            }
        }

        self.evict_unreachable(&lookup);
        lookup
    }

    // ---- query coordinator (spec §4.6) ----

    pub async fn find_peer(&mut self, target_peer: PeerId) -> Result<Option<PeerAddrInfo>, KadError> {
        if self.table.find(&target_peer).is_some() {
            if let Some(info) = self.peer_store.get_peer(&target_peer) {
                if !info.addrs.is_empty() {
                    return Ok(Some(info));
                }
            }
        }

        let target_key = Key::from_peer(&target_peer);
        let found = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let found_clone = found.clone();
        let lookup = self
            .run_lookup(
                target_key,
                move |key| {
                    let mut m = WireMessage::new(MessageType::FindNode);
                    m.key = Some(key.to_vec());
                    m
                },
                move |l| l.resiliency_reached() || found_clone.load(Ordering::Relaxed),
                move |_behaviour, _peer, msg| {
                    if msg.closer_peers.iter().any(|p| p.id == target_peer.to_bytes()) {
                        found.store(true, Ordering::Relaxed);
                    }
                },
            )
            .await;
        let _ = lookup;

        Ok(self.peer_store.get_peer(&target_peer).filter(|info| !info.addrs.is_empty()))
    }

    pub async fn get_closest_peers(&mut self, target: Vec<u8>) -> Result<Vec<PeerId>, KadError> {
        let target_key = Key::new(target);
        let resiliency = self.config.resiliency;
        let lookup = self
            .run_lookup(
                target_key,
                |key| {
                    let mut m = WireMessage::new(MessageType::FindNode);
                    m.key = Some(key.to_vec());
                    m
                },
                |l| l.resiliency_reached(),
                |_, _, _| {},
            )
            .await;
        let mut peers = lookup.queried_peers();
        peers.truncate(resiliency);
        Ok(peers)
    }

    pub async fn get_value(&mut self, key: Vec<u8>) -> Result<Vec<u8>, KadError> {
        if let Some(record) = self.records.get(&key) {
            if self.validator.validate(record, &crate::host::KeyBookAsPublicKeySource(self.key_book.as_ref()), now_ms()).is_ok() {
                return Ok(record.value.clone());
            }
        }

        let collected: Arc<std::sync::Mutex<Vec<Record>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
        let collected_clone = collected.clone();
        let target_key = Key::new(key.clone());
        let key_for_msg = key.clone();

        let lookup = self
            .run_lookup(
                target_key,
                move |_key| {
                    let mut m = WireMessage::new(MessageType::GetValue);
                    m.key = Some(key_for_msg.clone());
                    m
                },
                |l| l.resiliency_reached(),
                move |behaviour, _peer, msg| {
                    if let Some(ref wire_record) = msg.record {
                        if let Ok(record) = crate::handler::wire_record_to_record(wire_record) {
                            if behaviour.validator.validate(&record, &crate::host::KeyBookAsPublicKeySource(behaviour.key_book.as_ref()), now_ms()).is_ok() {
                                collected_clone.lock().expect("lock poisoned").push(record);
                            }
                        }
                    }
                },
            )
            .await;
        let _ = lookup;

        let records = Arc::try_unwrap(collected).map(|m| m.into_inner().expect("lock poisoned")).unwrap_or_default();
        if records.is_empty() {
            return Err(KadError::NotFound);
        }
        let refs: Vec<&Record> = records.iter().collect();
        let idx = self.validator.select(&key, &refs).map_err(KadError::Validation)?;
        Ok(records[idx].value.clone())
    }

    pub async fn put_value(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), KadError> {
        let record = crate::signing::sign_record(&self.keypair, key.clone(), value, now_ms())?;
        self.records.put(record.clone(), &self.validator, &crate::host::KeyBookAsPublicKeySource(self.key_book.as_ref()), now_ms())?;

        let target_key = Key::new(key.clone());
        let resiliency = self.config.resiliency;
        let lookup = self
            .run_lookup(
                target_key,
                |k| {
                    let mut m = WireMessage::new(MessageType::FindNode);
                    m.key = Some(k.to_vec());
                    m
                },
                move |l| l.resiliency_reached(),
                |_, _, _| {},
            )
            .await;

        let mut targets = lookup.queried_peers();
        targets.truncate(resiliency);
        let mut successes = 0u32;
        for peer in targets {
            let mut msg = WireMessage::new(MessageType::PutValue);
            msg.key = Some(key.clone());
            msg.record = Some(crate::handler::record_to_wire(&record));
            match handler::send_with_retry(self.host.as_ref(), peer, &msg, &self.config).await {
                Ok(_) => successes += 1,
                Err(e) => debug!(peer = %peer, error = %e, "PUT_VALUE delivery failed"),
            }
        }
        debug!(key = ?record.key, successes, "put_value replicated");
        Ok(())
    }

    pub async fn provide(&mut self, content_key: Vec<u8>, announce: bool) -> Result<(), KadError> {
        let expires_at = Instant::now() + self.config.provide_validity;
        let self_addrs = self.peer_store.get_peer(&self.local_id).map(|i| i.addrs).unwrap_or_default();
        self.providers.add_provider(content_key.clone(), self.local_id, self_addrs.clone(), expires_at);

        if !announce {
            return Ok(());
        }

        let target_key = Key::new(content_key.clone());
        let resiliency = self.config.resiliency;
        let lookup = self
            .run_lookup(
                target_key,
                |k| {
                    let mut m = WireMessage::new(MessageType::FindNode);
                    m.key = Some(k.to_vec());
                    m
                },
                move |l| l.resiliency_reached(),
                |_, _, _| {},
            )
            .await;

        let mut targets = lookup.queried_peers();
        targets.truncate(resiliency);
        for peer in targets {
            let mut msg = WireMessage::new(MessageType::AddProvider);
            msg.key = Some(content_key.clone());
            msg.provider_peers = vec![crate::protocol::WirePeer {
                id: self.local_id.to_bytes(),
                addrs: self_addrs.clone(),
                connection: ConnectionType::NotConnected,
            }];
            if let Err(e) = handler::send_with_retry(self.host.as_ref(), peer, &msg, &self.config).await {
                debug!(peer = %peer, error = %e, "ADD_PROVIDER delivery failed");
            }
        }
        Ok(())
    }

    pub async fn find_providers(&mut self, content_key: Vec<u8>, max: usize) -> Result<Vec<PeerId>, KadError> {
        let mut found: Vec<PeerId> = self
            .providers
            .get_providers(&content_key)
            .into_iter()
            .map(|p| p.provider)
            .collect();

        if found.len() >= max {
            found.truncate(max);
            return Ok(found);
        }

        let seen: Arc<std::sync::Mutex<HashSet<PeerId>>> = Arc::new(std::sync::Mutex::new(found.iter().copied().collect()));
        let collected: Arc<std::sync::Mutex<Vec<PeerId>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
        let collected_for_stop = collected.clone();
        let collected_for_response = collected.clone();
        let seen_for_response = seen.clone();
        let target_key = Key::new(content_key.clone());
        let key_for_msg = content_key.clone();
        let max_for_stop = max;
        let found_len = found.len();

        let lookup = self
            .run_lookup(
                target_key,
                move |_key| {
                    let mut m = WireMessage::new(MessageType::GetProviders);
                    m.key = Some(key_for_msg.clone());
                    m
                },
                move |l| found_len + collected_for_stop.lock().expect("lock poisoned").len() >= max_for_stop || l.resiliency_reached(),
                move |_behaviour, _peer, msg| {
                    let mut guard = collected_for_response.lock().expect("lock poisoned");
                    let mut seen_guard = seen_for_response.lock().expect("lock poisoned");
                    for p in &msg.provider_peers {
                        if let Ok(peer_id) = PeerId::from_bytes(&p.id) {
                            if seen_guard.insert(peer_id) {
                                guard.push(peer_id);
                            }
                        }
                    }
                },
            )
            .await;
        let _ = lookup;

        found.extend(collected.lock().expect("lock poisoned").iter().copied());
        found.truncate(max);
        Ok(found)
    }

    // ---- bootstrap & refresh (spec §4.9) ----

    pub async fn bootstrap(&mut self) -> Result<(), KadError> {
        let gate = Self::build_gate(self.latency.as_ref(), self.config.max_latency);
        let report = jobs::seed_connect(self.host.as_ref(), self.conn_manager.as_ref(), &mut self.table, &gate, &self.config).await;
        info!(attempted = report.attempted, succeeded = report.succeeded, "bootstrap seed-connect complete");

        jobs::refresh_existing(self.host.as_ref(), &mut self.table, self.conn_manager.as_ref()).await;

        let target_size = self.config.bucket_size * 2;
        for _round in 0..5 {
            if self.table.list_peers().len() >= target_size {
                break;
            }
            let random_target = Key::new((0..32).map(|_| rand::random::<u8>()).collect::<Vec<u8>>());
            let _ = self
                .run_lookup(
                    random_target,
                    |key| {
                        let mut m = WireMessage::new(MessageType::FindNode);
                        m.key = Some(key.to_vec());
                        m
                    },
                    |l| l.resiliency_reached(),
                    |_, _, _| {},
                )
                .await;

            let self_target = Key::from_peer(&self.local_id);
            let _ = self
                .run_lookup(
                    self_target,
                    |key| {
                        let mut m = WireMessage::new(MessageType::FindNode);
                        m.key = Some(key.to_vec());
                        m
                    },
                    |l| l.resiliency_reached(),
                    |_, _, _| {},
                )
                .await;
        }

        if self.table.list_peers().len() < self.config.resiliency {
            warn!("routing table below resiliency after bootstrap, retrying seed-connect against the bootstrap list");
            let gate = Self::build_gate(self.latency.as_ref(), self.config.max_latency);
            let retry_report =
                jobs::seed_connect(self.host.as_ref(), self.conn_manager.as_ref(), &mut self.table, &gate, &self.config).await;
            info!(
                attempted = retry_report.attempted,
                succeeded = retry_report.succeeded,
                "bootstrap seed-connect retry complete"
            );
            if self.table.list_peers().len() < self.config.resiliency {
                warn!("bootstrap finished with fewer peers than the configured resiliency");
            }
        }
        Ok(())
    }

    pub async fn refresh(&mut self, skip_cpls: &[usize]) -> Result<(), KadError> {
        let targets = jobs::refresh_targets(&self.table, skip_cpls);
        for target in targets {
            let _ = self
                .run_lookup(
                    target,
                    |key| {
                        let mut m = WireMessage::new(MessageType::FindNode);
                        m.key = Some(key.to_vec());
                        m
                    },
                    |l| l.resiliency_reached(),
                    |_, _, _| {},
                )
                .await;
        }
        jobs::refresh_existing(self.host.as_ref(), &mut self.table, self.conn_manager.as_ref()).await;
        Ok(())
    }
}
