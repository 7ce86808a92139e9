// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Drives `handler::handle_request` directly against a hand-built
//! [`HandlerContext`], with no actor or network involved, to check the
//! `filter_localhost_in_responses` knob (spec §4.7's FIND_NODE handler).

use std::collections::HashMap;
use std::time::Duration;

use ant_kad::config::Config;
use ant_kad::handler::{handle_request, HandlerContext};
use ant_kad::host::{PeerAddrInfo, PeerStore};
use ant_kad::kbucket::{EvictionGate, Table, TableConfig};
use ant_kad::protocol::{MessageType, WireMessage};
use ant_kad::record::{MemoryProviderStore, MemoryStore};
use ant_kad::validator::{NamespacedValidator, NoKeys};
use libp2p_identity::PeerId;

struct NoLatency;
impl EvictionGate for NoLatency {
    fn latency_exceeded(&self, _peer: &PeerId) -> bool {
        false
    }
}

struct FixedPeerStore {
    addrs: HashMap<PeerId, PeerAddrInfo>,
}

impl PeerStore for FixedPeerStore {
    fn add_addrs(&self, _peer: PeerId, _addrs: Vec<Vec<u8>>, _ttl: Duration) {}

    fn get_peer(&self, peer: &PeerId) -> Option<PeerAddrInfo> {
        self.addrs.get(peer).cloned()
    }
}

/// `FindNode` returning a neighbor whose only known address is loopback;
/// with filtering on, that address must be stripped from the response
/// (but the peer id itself still appears), and with filtering off it
/// must be passed through unchanged.
#[tokio::test]
async fn find_node_response_respects_the_localhost_filter_flag() {
    let local = PeerId::random();
    let neighbor = PeerId::random();
    let sender = PeerId::random();

    let loopback_v4 = vec![0x04, 127, 0, 0, 1];
    let mut addrs = HashMap::new();
    addrs.insert(
        neighbor,
        PeerAddrInfo {
            addrs: vec![loopback_v4.clone()],
        },
    );
    let peer_store = FixedPeerStore { addrs };

    let mut table = Table::new(local, TableConfig::default());
    table.try_add(neighbor, true, true, &NoLatency);

    let mut records = MemoryStore::new();
    let mut providers = MemoryProviderStore::new();
    let validator = NamespacedValidator::new(Duration::from_secs(86400));

    let mut request = WireMessage::new(MessageType::FindNode);
    request.key = Some(ant_kad::key::Key::from_peer(&neighbor).as_bytes().to_vec());

    let mut filtering_config = Config::new();
    filtering_config.filter_localhost_in_responses = true;
    let mut ctx = HandlerContext {
        local_id: local,
        table: &mut table,
        gate: &NoLatency,
        records: &mut records,
        providers: &mut providers,
        peer_store: &peer_store,
        validator: &validator,
        keys: &NoKeys,
        config: &filtering_config,
        now_ms: 0,
    };
    let response = handle_request(&mut ctx, sender, request.clone()).unwrap().expect("FindNode always replies");
    let wire_peer = response.closer_peers.iter().find(|p| p.id == neighbor.to_bytes()).expect("neighbor must be returned");
    assert!(wire_peer.addrs.is_empty(), "loopback address must be filtered out");

    let mut passthrough_config = Config::new();
    passthrough_config.filter_localhost_in_responses = false;
    let mut ctx = HandlerContext {
        local_id: local,
        table: &mut table,
        gate: &NoLatency,
        records: &mut records,
        providers: &mut providers,
        peer_store: &peer_store,
        validator: &validator,
        keys: &NoKeys,
        config: &passthrough_config,
        now_ms: 0,
    };
    let response = handle_request(&mut ctx, sender, request).unwrap().expect("FindNode always replies");
    let wire_peer = response.closer_peers.iter().find(|p| p.id == neighbor.to_bytes()).expect("neighbor must be returned");
    assert_eq!(wire_peer.addrs, vec![loopback_v4], "filtering disabled must pass the address through");
}
