// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Bootstrap and periodic-refresh helpers (spec §4.9). The multi-lookup
//! phases (peer discovery, self-lookup) live on [`crate::behaviour::Behaviour`]
//! itself, since they need the full query coordinator; this module covers
//! the liveness-probing and target-generation pieces that don't.

use std::time::Duration;

use libp2p_identity::PeerId;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::TransportError;
use crate::host::{ConnManager, Host};
use crate::kbucket::{EvictionGate, Table};
use crate::key::{Key, NUM_BUCKETS};
use crate::protocol::{MessageType, WireMessage};

/// Outcome of the seed-connect phase: how many configured bootstrap
/// peers were reachable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedConnectReport {
    pub attempted: usize,
    pub succeeded: usize,
}

async fn ping(host: &dyn Host, peer: PeerId, timeout: Duration) -> Result<(), TransportError> {
    if peer == host.id() {
        return Err(TransportError::SelfDial);
    }
    let mut stream = host.open_stream(peer, &[crate::protocol::PROTOCOL_ID], timeout).await?;
    let bytes = WireMessage::new(MessageType::Ping)
        .encode()
        .map_err(|e| TransportError::Other(e.to_string()))?;
    stream.write(bytes::Bytes::from(bytes)).await?;
    let raw = tokio::time::timeout(timeout, stream.read())
        .await
        .map_err(|_| TransportError::Timeout)??;
    stream.close().await;
    WireMessage::decode(&raw).map_err(|e| TransportError::Other(e.to_string()))?;
    Ok(())
}

/// Phase 1: dial each configured bootstrap peer, protecting and inserting
/// (non-replaceable) on success. Never fails the overall bootstrap.
pub async fn seed_connect(host: &dyn Host, conn_manager: &dyn ConnManager, table: &mut Table, gate: &dyn EvictionGate, config: &Config) -> SeedConnectReport {
    let mut report = SeedConnectReport::default();
    for peer in config.bootstrap_peers.clone() {
        report.attempted += 1;
        match ping(host, peer, Duration::from_secs(10)).await {
            Ok(()) => {
                conn_manager.protect(&peer, "kad-bootstrap");
                table.try_add(peer, false, false, gate);
                report.succeeded += 1;
            }
            Err(e) => warn!(peer = %peer, error = %e, "bootstrap seed peer unreachable"),
        }
    }
    report
}

/// Phase 2: verify liveness of everyone currently in the routing table.
/// Unresponsive peers are evicted; survivors become replaceable again.
pub async fn refresh_existing(host: &dyn Host, table: &mut Table, conn_manager: &dyn ConnManager) {
    let peers: Vec<PeerId> = table.list_peers().into_iter().map(|e| e.peer_id).collect();
    for peer in peers {
        match ping(host, peer, Duration::from_secs(3)).await {
            Ok(()) => table.mark_replaceable(&peer),
            Err(_) => {
                table.remove(&peer);
                conn_manager.unprotect(&peer, "kad-bootstrap");
                debug!(peer = %peer, "evicted unresponsive peer during refresh");
            }
        }
    }
}

/// Probing targets for periodic bucket refresh: one random key per CPL
/// from 0 up to the highest populated bucket, honoring the gap-fill rule
/// (spec §4.9): an empty bucket does not stop generation of targets for
/// higher CPLs, so buckets populated only by manual addition still get
/// refreshed.
pub fn refresh_targets(table: &Table, skip_cpls: &[usize]) -> Vec<Key> {
    let Some(highest) = table.highest_populated_cpl() else {
        return Vec::new();
    };
    (0..=highest.min(NUM_BUCKETS - 1))
        .filter(|cpl| !skip_cpls.contains(cpl))
        .map(|cpl| table.gen_random_peer_id_with_cpl(cpl))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kbucket::TableConfig;

    struct NoLatency;
    impl EvictionGate for NoLatency {
        fn latency_exceeded(&self, _peer: &PeerId) -> bool {
            false
        }
    }

    #[test]
    fn refresh_targets_cover_every_cpl_up_to_highest_populated() {
        let local = PeerId::random();
        let mut table = Table::new(local, TableConfig::default());
        // Force a peer into bucket 10 directly via the public API by
        // retrying random peers until one lands there (bounded attempts;
        // XOR space is uniform so this converges quickly in practice).
        let mut placed = false;
        for _ in 0..10_000 {
            let candidate = PeerId::random();
            let cpl = crate::key::Key::from_peer(&local).cpl(&crate::key::Key::from_peer(&candidate));
            if cpl == 10 {
                table.try_add(candidate, true, true, &NoLatency);
                placed = true;
                break;
            }
        }
        assert!(placed, "expected to find a peer at CPL 10 within the attempt budget");

        let targets = refresh_targets(&table, &[3]);
        assert!(targets.len() >= 8, "gap at CPL 3 must not stop higher-CPL targets");
    }

    #[test]
    fn empty_table_yields_no_refresh_targets() {
        let local = PeerId::random();
        let table = Table::new(local, TableConfig::default());
        assert!(refresh_targets(&table, &[]).is_empty());
    }
}
