// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! A single k-bucket: an active list plus a replacement cache.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use libp2p_identity::PeerId;
use smallvec::SmallVec;

/// Most buckets run at the default capacity of 20; inline storage for
/// that many entries avoids a heap allocation per bucket across the
/// 256 buckets a routing table holds.
type ActiveList = SmallVec<[PeerEntry; 20]>;

/// An entry tracked by the routing table for one peer.
#[derive(Clone, Debug)]
pub struct PeerEntry {
    pub peer_id: PeerId,
    pub added_at: Instant,
    pub last_useful_at: Instant,
    pub replaceable: bool,
    pub added_by_query: bool,
}

impl PeerEntry {
    pub fn new(peer_id: PeerId, replaceable: bool, added_by_query: bool) -> Self {
        let now = Instant::now();
        Self {
            peer_id,
            added_at: now,
            last_useful_at: now,
            replaceable,
            added_by_query,
        }
    }

    /// Record a successful query/outbound interaction with this peer.
    pub fn touch(&mut self) {
        self.last_useful_at = Instant::now();
    }
}

/// Outcome of attempting to insert a peer into a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Peer is now (or already was) in the active list.
    Active,
    /// Peer replaced an evictable active entry, which moved to the
    /// transient evicted bin (returned here, not retained anywhere).
    Replaced(PeerId),
    /// Bucket was full and no entry was evictable; peer was appended to
    /// the replacement cache.
    Replacement,
    /// Both the active list and the replacement cache are full.
    Full,
}

/// Policy consulted to decide whether an active entry may be evicted to
/// make room for a new peer.
pub trait EvictionGate: Send + Sync {
    /// Whether `peer`'s measured latency exceeds the configured maximum.
    fn latency_exceeded(&self, peer: &PeerId) -> bool;
}

pub struct Bucket {
    capacity: usize,
    active: ActiveList,
    replacements: VecDeque<PeerEntry>,
    usefulness_grace_period: Duration,
}

impl Bucket {
    pub fn new(capacity: usize, usefulness_grace_period: Duration) -> Self {
        Self {
            capacity,
            active: SmallVec::with_capacity(capacity),
            replacements: VecDeque::with_capacity(capacity),
            usefulness_grace_period,
        }
    }

    pub fn active(&self) -> &[PeerEntry] {
        &self.active
    }

    pub fn replacements(&self) -> impl Iterator<Item = &PeerEntry> {
        self.replacements.iter()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.active.len() >= self.capacity
    }

    pub fn find(&self, peer: &PeerId) -> Option<&PeerEntry> {
        self.active
            .iter()
            .find(|e| &e.peer_id == peer)
            .or_else(|| self.replacements.iter().find(|e| &e.peer_id == peer))
    }

    pub fn find_mut(&mut self, peer: &PeerId) -> Option<&mut PeerEntry> {
        if let Some(pos) = self.active.iter().position(|e| &e.peer_id == peer) {
            return self.active.get_mut(pos);
        }
        self.replacements.iter_mut().find(|e| &e.peer_id == peer)
    }

    /// Try to add `peer` to this bucket. See spec §4.2 for the replacement
    /// policy: the least-recently-useful active entry that is replaceable,
    /// exceeds the latency gate, and is past its usefulness grace period
    /// is evicted; otherwise the new peer goes to the replacement cache
    /// (if it has room) or is dropped.
    pub fn try_add(
        &mut self,
        peer: PeerId,
        query_peer: bool,
        replaceable: bool,
        gate: &dyn EvictionGate,
    ) -> InsertOutcome {
        if let Some(existing) = self.find_mut(&peer) {
            existing.touch();
            if query_peer {
                existing.added_by_query = true;
            }
            return InsertOutcome::Active;
        }

        if !self.is_full() {
            self.active.push(PeerEntry::new(peer, replaceable, query_peer));
            return InsertOutcome::Active;
        }

        if let Some(victim_idx) = self.find_eviction_candidate(gate) {
            let victim = self.active.swap_remove(victim_idx);
            self.active.push(PeerEntry::new(peer, replaceable, query_peer));
            return InsertOutcome::Replaced(victim.peer_id);
        }

        if self.replacements.len() < self.capacity {
            // Remove any stale copy of this peer already queued.
            self.replacements.retain(|e| e.peer_id != peer);
            self.replacements
                .push_back(PeerEntry::new(peer, replaceable, query_peer));
            return InsertOutcome::Replacement;
        }

        InsertOutcome::Full
    }

    fn find_eviction_candidate(&self, gate: &dyn EvictionGate) -> Option<usize> {
        let now = Instant::now();
        self.active
            .iter()
            .enumerate()
            .filter(|(_, e)| {
                e.replaceable
                    && gate.latency_exceeded(&e.peer_id)
                    && now.duration_since(e.last_useful_at) > self.usefulness_grace_period
            })
            .min_by_key(|(_, e)| e.last_useful_at)
            .map(|(idx, _)| idx)
    }

    /// Remove `peer` from active or replacements. If it was active, the
    /// most recently queued replacement is promoted to take its place.
    pub fn remove(&mut self, peer: &PeerId) -> Option<PeerEntry> {
        if let Some(pos) = self.active.iter().position(|e| &e.peer_id == peer) {
            let removed = self.active.remove(pos);
            if let Some(promoted) = self.replacements.pop_back() {
                self.active.push(promoted);
            }
            return Some(removed);
        }
        if let Some(pos) = self.replacements.iter().position(|e| &e.peer_id == peer) {
            return self.replacements.remove(pos);
        }
        None
    }
}
