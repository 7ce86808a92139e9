// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The iterative lookup engine's peerset state machine.
//!
//! [`Lookup`] is deliberately synchronous: it tracks which peers have
//! been heard of, are being waited on, or are done, and tells its caller
//! which peers to contact next. The actor that owns a `Lookup` is
//! responsible for actually dispatching RPCs and feeding results back in
//! via [`Lookup::on_success`]/[`Lookup::on_failure`] — the same split the
//! teacher's `query.rs`/`behaviour.rs` pair uses between query state and
//! the event loop that drives it.

use std::time::{Duration, Instant};

use libp2p_identity::PeerId;

use crate::error::TransportError;
use crate::key::{Distance, Key};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Heard,
    Waiting,
    Queried,
    Unreachable,
}

#[derive(Debug, Clone)]
struct Entry {
    peer_id: PeerId,
    distance: Distance,
    state: PeerState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Success,
    NoMorePeers,
    Timeout,
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
pub struct LookupConfig {
    pub alpha: usize,
    pub resiliency: usize,
    pub overall_timeout: Duration,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            alpha: 10,
            resiliency: 3,
            overall_timeout: Duration::from_secs(60),
        }
    }
}

/// The peerset driving one iterative lookup.
pub struct Lookup {
    target: Key,
    entries: Vec<Entry>,
    config: LookupConfig,
    started_at: Instant,
    errors: Vec<(PeerId, TransportError)>,
    cancelled: bool,
}

impl Lookup {
    /// Seed a new lookup from `seed_peers`, all starting in state `Heard`.
    pub fn new(target: Key, seed_peers: impl IntoIterator<Item = PeerId>, config: LookupConfig) -> Self {
        let mut entries: Vec<Entry> = Vec::new();
        for peer_id in seed_peers {
            if entries.iter().any(|e| e.peer_id == peer_id) {
                continue;
            }
            let distance = target.distance(&Key::from_peer(&peer_id));
            entries.push(Entry {
                peer_id,
                distance,
                state: PeerState::Heard,
            });
        }
        entries.sort_by(|a, b| a.distance.cmp(&b.distance));
        Self {
            target,
            entries,
            config,
            started_at: Instant::now(),
            errors: Vec::new(),
            cancelled: false,
        }
    }

    pub fn target(&self) -> &Key {
        &self.target
    }

    fn waiting_count(&self) -> usize {
        self.entries.iter().filter(|e| e.state == PeerState::Waiting).count()
    }

    /// Up to `alpha - |Waiting|` closest `Heard` peers, transitioned to
    /// `Waiting`. Returns an empty vec once the batch is exhausted.
    pub fn next_batch(&mut self) -> Vec<PeerId> {
        let max_waiting = self.config.alpha.saturating_sub(self.waiting_count());
        if max_waiting == 0 {
            return Vec::new();
        }
        let mut batch = Vec::new();
        for entry in self.entries.iter_mut() {
            if batch.len() >= max_waiting {
                break;
            }
            if entry.state == PeerState::Heard {
                entry.state = PeerState::Waiting;
                batch.push(entry.peer_id);
            }
        }
        batch
    }

    /// A subquery to `peer` succeeded, discovering `found_peers`. Any
    /// peer not already tracked is inserted in state `Heard`.
    pub fn on_success(&mut self, peer: &PeerId, found_peers: Vec<PeerId>) {
        if let Some(entry) = self.entries.iter_mut().find(|e| &e.peer_id == peer) {
            if entry.state == PeerState::Waiting {
                entry.state = PeerState::Queried;
            }
        }
        for found in found_peers {
            if self.entries.iter().any(|e| e.peer_id == found) {
                continue;
            }
            let distance = self.target.distance(&Key::from_peer(&found));
            self.entries.push(Entry {
                peer_id: found,
                distance,
                state: PeerState::Heard,
            });
        }
        self.entries.sort_by(|a, b| a.distance.cmp(&b.distance));
    }

    /// A subquery to `peer` failed with `cause`.
    pub fn on_failure(&mut self, peer: &PeerId, cause: TransportError) {
        if let Some(entry) = self.entries.iter_mut().find(|e| &e.peer_id == peer) {
            if entry.state == PeerState::Waiting {
                entry.state = PeerState::Unreachable;
            }
        }
        self.errors.push((*peer, cause));
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    fn count(&self, state: PeerState) -> usize {
        self.entries.iter().filter(|e| e.state == state).count()
    }

    /// Peers in state `Queried`, closest first.
    pub fn queried_peers(&self) -> Vec<PeerId> {
        self.entries
            .iter()
            .filter(|e| e.state == PeerState::Queried)
            .map(|e| e.peer_id)
            .collect()
    }

    pub fn unreachable_peers(&self) -> Vec<PeerId> {
        self.entries
            .iter()
            .filter(|e| e.state == PeerState::Unreachable)
            .map(|e| e.peer_id)
            .collect()
    }

    pub fn errors(&self) -> &[(PeerId, TransportError)] {
        &self.errors
    }

    pub fn resiliency(&self) -> usize {
        self.config.resiliency
    }

    /// Check termination: a caller-supplied `stop` predicate takes
    /// priority, then the structural conditions from spec §4.5 step 3/4.
    pub fn check_termination(&self, stop: impl FnOnce(&Lookup) -> bool) -> Option<Termination> {
        if self.cancelled {
            return Some(Termination::Cancelled);
        }
        if self.started_at.elapsed() > self.config.overall_timeout {
            return Some(Termination::Timeout);
        }
        if stop(self) {
            return Some(Termination::Success);
        }
        if self.count(PeerState::Heard) == 0 && self.count(PeerState::Waiting) == 0 {
            return Some(Termination::NoMorePeers);
        }
        None
    }

    /// Default stop predicate: terminate once `resiliency` peers have
    /// reached `Queried`.
    pub fn resiliency_reached(&self) -> bool {
        self.count(PeerState::Queried) >= self.config.resiliency
    }
}
