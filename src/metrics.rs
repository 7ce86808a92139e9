// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! In-process counters and gauges. No exporter is wired up here — a
//! Prometheus/OpenMetrics backend is an out-of-scope host concern
//! (spec §1); an embedder reads these fields directly or copies them
//! into its own reporting pipeline.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct KadMetrics {
    pub lookups_started: AtomicU64,
    pub lookups_succeeded: AtomicU64,
    pub lookups_timed_out: AtomicU64,
    pub lookups_cancelled: AtomicU64,
    pub rpcs_sent: AtomicU64,
    pub rpcs_failed: AtomicU64,
    pub rpcs_retried: AtomicU64,
    pub records_stored: AtomicU64,
    pub records_rejected: AtomicU64,
    pub providers_stored: AtomicU64,
    pub routing_table_evictions: AtomicU64,
}

impl KadMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> KadMetricsSnapshot {
        KadMetricsSnapshot {
            lookups_started: self.lookups_started.load(Ordering::Relaxed),
            lookups_succeeded: self.lookups_succeeded.load(Ordering::Relaxed),
            lookups_timed_out: self.lookups_timed_out.load(Ordering::Relaxed),
            lookups_cancelled: self.lookups_cancelled.load(Ordering::Relaxed),
            rpcs_sent: self.rpcs_sent.load(Ordering::Relaxed),
            rpcs_failed: self.rpcs_failed.load(Ordering::Relaxed),
            rpcs_retried: self.rpcs_retried.load(Ordering::Relaxed),
            records_stored: self.records_stored.load(Ordering::Relaxed),
            records_rejected: self.records_rejected.load(Ordering::Relaxed),
            providers_stored: self.providers_stored.load(Ordering::Relaxed),
            routing_table_evictions: self.routing_table_evictions.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KadMetricsSnapshot {
    pub lookups_started: u64,
    pub lookups_succeeded: u64,
    pub lookups_timed_out: u64,
    pub lookups_cancelled: u64,
    pub rpcs_sent: u64,
    pub rpcs_failed: u64,
    pub rpcs_retried: u64,
    pub records_stored: u64,
    pub records_rejected: u64,
    pub providers_stored: u64,
    pub routing_table_evictions: u64,
}
