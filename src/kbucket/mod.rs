// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The XOR/k-bucket routing table: `NUM_BUCKETS` buckets indexed by the
//! common-prefix-length between the local peer and each known peer.

mod bucket;

pub use bucket::{Bucket, EvictionGate, InsertOutcome, PeerEntry};

use std::time::Duration;

use libp2p_identity::PeerId;
use rand::RngCore;

use crate::key::{Key, NUM_BUCKETS};

/// Routing table configuration.
#[derive(Clone, Debug)]
pub struct TableConfig {
    /// `K`: active entries per bucket.
    pub bucket_size: usize,
    /// Grace period protecting recently-useful entries from eviction.
    pub usefulness_grace_period: Duration,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            bucket_size: 20,
            usefulness_grace_period: Duration::from_secs(60),
        }
    }
}

/// The k-bucket routing table for one local peer.
pub struct Table {
    local_id: PeerId,
    local_key: Key,
    buckets: Vec<Bucket>,
    config: TableConfig,
}

impl Table {
    pub fn new(local_id: PeerId, config: TableConfig) -> Self {
        let local_key = Key::from_peer(&local_id);
        let buckets = (0..NUM_BUCKETS)
            .map(|_| Bucket::new(config.bucket_size, config.usefulness_grace_period))
            .collect();
        Self {
            local_id,
            local_key,
            buckets,
            config,
        }
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    fn bucket_index_for(&self, peer: &PeerId) -> Option<usize> {
        if *peer == self.local_id {
            return None;
        }
        let key = Key::from_peer(peer);
        Some(self.local_key.distance(&key).bucket_index())
    }

    /// Attempt to add `peer` to the routing table. Returns `true` iff the
    /// peer ends up in an active list (refuses to ever add the local id).
    pub fn try_add(
        &mut self,
        peer: PeerId,
        query_peer: bool,
        replaceable: bool,
        gate: &dyn EvictionGate,
    ) -> bool {
        let Some(idx) = self.bucket_index_for(&peer) else {
            return false;
        };
        match self.buckets[idx].try_add(peer, query_peer, replaceable, gate) {
            InsertOutcome::Active | InsertOutcome::Replaced(_) => true,
            InsertOutcome::Replacement | InsertOutcome::Full => false,
        }
    }

    /// Remove `peer` from the table. Returns `true` iff it was present in
    /// an active list.
    pub fn remove(&mut self, peer: &PeerId) -> bool {
        let Some(idx) = self.bucket_index_for(peer) else {
            return false;
        };
        self.buckets[idx].remove(peer).is_some()
    }

    pub fn find(&self, peer: &PeerId) -> Option<&PeerEntry> {
        let idx = self.bucket_index_for(peer)?;
        self.buckets[idx].find(peer)
    }

    /// Mark a successful query/outbound interaction with `peer`, if known.
    pub fn touch(&mut self, peer: &PeerId) {
        if let Some(idx) = self.bucket_index_for(peer) {
            if let Some(entry) = self.buckets[idx].find_mut(peer) {
                entry.touch();
            }
        }
    }

    /// Mark `peer` as replaceable again, e.g. after it survives a
    /// bootstrap liveness check that was seeded non-replaceable.
    pub fn mark_replaceable(&mut self, peer: &PeerId) {
        if let Some(idx) = self.bucket_index_for(peer) {
            if let Some(entry) = self.buckets[idx].find_mut(peer) {
                entry.replaceable = true;
            }
        }
    }

    /// Up to `n` peers nearest to `key`, sorted ascending by distance.
    /// Ties are broken by insertion order (the order entries were first
    /// encountered while scanning buckets closest-first).
    pub fn nearest(&self, key: &Key, n: usize) -> Vec<PeerId> {
        let mut candidates: Vec<(crate::key::Distance, usize, PeerId)> = Vec::new();
        for bucket in &self.buckets {
            for (seq, entry) in bucket.active().iter().enumerate() {
                let d = key.distance(&Key::from_peer(&entry.peer_id));
                candidates.push((d, seq, entry.peer_id));
            }
        }
        candidates.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        candidates.into_iter().take(n).map(|(_, _, p)| p).collect()
    }

    /// Number of active peers whose bucket index equals `cpl`.
    pub fn n_peers_for_cpl(&self, cpl: usize) -> usize {
        self.buckets.get(cpl).map(|b| b.len()).unwrap_or(0)
    }

    /// Highest bucket index with at least one active peer, if any.
    pub fn highest_populated_cpl(&self) -> Option<usize> {
        self.buckets.iter().rposition(|b| !b.is_empty())
    }

    /// Generate a random peer id whose key shares exactly `cpl` leading
    /// bits with the local key. Used as a bucket-refresh probing target.
    pub fn gen_random_peer_id_with_cpl(&self, cpl: usize) -> Key {
        let mut rng = rand::thread_rng();
        let local_bytes = {
            // Pad/truncate the local key to the fixed key length the same
            // way `Key::distance` does, by round-tripping through a
            // zero-padded buffer.
            let mut buf = [0u8; crate::key::KEY_LEN];
            let src = self.local_key.as_bytes();
            let n = src.len().min(buf.len());
            buf[..n].copy_from_slice(&src[..n]);
            buf
        };
        let mut out = [0u8; crate::key::KEY_LEN];
        rng.fill_bytes(&mut out);

        let cpl = cpl.min(NUM_BUCKETS);
        for bit in 0..cpl {
            let byte = bit / 8;
            let mask = 0x80u8 >> (bit % 8);
            let local_bit = local_bytes[byte] & mask;
            out[byte] = (out[byte] & !mask) | local_bit;
        }
        if cpl < NUM_BUCKETS {
            // Flip the first bit after the shared prefix so the CPL is
            // exactly `cpl`, not merely "at least".
            let byte = cpl / 8;
            let mask = 0x80u8 >> (cpl % 8);
            out[byte] ^= mask;
        }
        Key::new(out.to_vec())
    }

    pub fn list_peers(&self) -> Vec<PeerEntry> {
        self.buckets
            .iter()
            .flat_map(|b| b.active().iter().cloned())
            .collect()
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoLatency;
    impl EvictionGate for NoLatency {
        fn latency_exceeded(&self, _peer: &PeerId) -> bool {
            false
        }
    }

    #[test]
    fn refuses_to_add_local_peer() {
        let local = PeerId::random();
        let mut table = Table::new(local, TableConfig::default());
        assert!(!table.try_add(local, true, true, &NoLatency));
        assert!(table.find(&local).is_none());
    }

    #[test]
    fn bucket_placement_matches_cpl() {
        let local = PeerId::random();
        let mut table = Table::new(local, TableConfig::default());
        let peer = PeerId::random();
        table.try_add(peer, true, true, &NoLatency);
        let expected = Key::from_peer(&local).distance(&Key::from_peer(&peer)).bucket_index();
        let idx = table.bucket_index_for(&peer).unwrap();
        assert_eq!(idx, expected);
    }

    #[test]
    fn uniqueness_across_many_inserts() {
        let local = PeerId::random();
        let mut table = Table::new(local, TableConfig::default());
        let mut peers = Vec::new();
        for _ in 0..200 {
            let p = PeerId::random();
            table.try_add(p, true, true, &NoLatency);
            peers.push(p);
        }
        let mut seen = std::collections::HashSet::new();
        for entry in table.list_peers() {
            assert!(seen.insert(entry.peer_id), "peer appeared in more than one bucket");
        }
    }

    #[test]
    fn gen_random_peer_id_with_cpl_hits_target_cpl() {
        let local = PeerId::random();
        let table = Table::new(local, TableConfig::default());
        for cpl in [0usize, 1, 8, 50, 120, 255] {
            let key = table.gen_random_peer_id_with_cpl(cpl);
            let local_key = Key::from_peer(&local);
            assert_eq!(local_key.cpl(&key) as usize, cpl);
        }
    }

    #[test]
    fn nearest_orders_by_distance() {
        let local = PeerId::random();
        let mut table = Table::new(local, TableConfig::default());
        for _ in 0..30 {
            table.try_add(PeerId::random(), true, true, &NoLatency);
        }
        let target = Key::from_peer(&local);
        let nearest = table.nearest(&target, 5);
        let mut prev = None;
        for p in &nearest {
            let d = target.distance(&Key::from_peer(p));
            if let Some(prev_d) = prev {
                assert!(prev_d <= d);
            }
            prev = Some(d);
        }
    }
}
