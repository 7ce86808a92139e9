// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Host-facing trait boundary (spec §6.2): the peer-to-peer transport,
//! address book, key book and connection manager this crate consumes but
//! does not implement. A real binding lives in the embedding application;
//! `test-only` in-memory implementations exercise the core in this
//! crate's own integration tests.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use libp2p_identity::{PeerId, PublicKey};

use crate::error::TransportError;

/// A single request/response (or fire-and-forget) byte exchange with a
/// remote peer. Framing below the message schema is the host's concern.
#[async_trait]
pub trait Stream: Send {
    async fn write(&mut self, bytes: Bytes) -> Result<(), TransportError>;
    async fn read(&mut self) -> Result<Bytes, TransportError>;
    async fn close(&mut self);
}

/// The peer-to-peer host: stream/connection management, multiplexing,
/// identify and transport security are all out of scope here (spec §1);
/// this is the narrow surface the core calls into.
#[async_trait]
pub trait Host: Send + Sync {
    fn id(&self) -> PeerId;

    async fn open_stream(&self, peer: PeerId, protocol_ids: &[&str], timeout: Duration) -> Result<Box<dyn Stream>, TransportError>;
}

/// Addresses known for a peer, as tracked by the host's address book.
#[derive(Clone, Debug, Default)]
pub struct PeerAddrInfo {
    pub addrs: Vec<Vec<u8>>,
}

/// The host's address book; the DHT writes addresses discovered during
/// queries and reads them when assembling protocol responses or dialing.
pub trait PeerStore: Send + Sync {
    fn add_addrs(&self, peer: PeerId, addrs: Vec<Vec<u8>>, ttl: Duration);
    fn get_peer(&self, peer: &PeerId) -> Option<PeerAddrInfo>;
}

/// Resolves public/private keys; only the local peer's private key is
/// ever requested.
pub trait KeyBook: Send + Sync {
    fn pub_key(&self, peer: &PeerId) -> Option<PublicKey>;
}

impl crate::validator::PublicKeySource for dyn KeyBook {
    fn public_key(&self, peer: &PeerId) -> Option<PublicKey> {
        self.pub_key(peer)
    }
}

/// Adapts a `&dyn KeyBook` to `&dyn PublicKeySource`; trait objects cannot
/// be coerced directly between unrelated trait types, so call sites that
/// need a `PublicKeySource` from a `KeyBook` wrap it with this adapter.
pub struct KeyBookAsPublicKeySource<'a>(pub &'a dyn KeyBook);

impl<'a> crate::validator::PublicKeySource for KeyBookAsPublicKeySource<'a> {
    fn public_key(&self, peer: &PeerId) -> Option<PublicKey> {
        self.0.pub_key(peer)
    }
}

/// Connection protection: peers that populate the routing table are
/// protected from the host's connection-pressure eviction.
pub trait ConnManager: Send + Sync {
    fn protect(&self, peer: &PeerId, tag: &str);
    fn unprotect(&self, peer: &PeerId, tag: &str);
}

/// EWMA latency per peer, consulted by the routing table's eviction gate.
pub trait PeerLatencyMetrics: Send + Sync {
    fn latency_ewma(&self, peer: &PeerId) -> Option<Duration>;
}

/// Adapts a [`PeerLatencyMetrics`] collaborator plus a configured ceiling
/// into the [`crate::kbucket::EvictionGate`] the routing table consults.
pub struct LatencyGate<'a> {
    pub metrics: &'a dyn PeerLatencyMetrics,
    pub max_latency: Duration,
}

impl<'a> crate::kbucket::EvictionGate for LatencyGate<'a> {
    fn latency_exceeded(&self, peer: &PeerId) -> bool {
        match self.metrics.latency_ewma(peer) {
            Some(latency) => latency > self.max_latency,
            None => false,
        }
    }
}
