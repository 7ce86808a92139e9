// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Configuration (spec §6.4). No file or CLI loader is implemented —
//! that surface is out of scope (spec §1); embedders set fields on
//! [`Config`] directly or via the builder methods.

use std::time::Duration;

use libp2p_identity::PeerId;

/// Whether this node answers incoming RPCs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    Client,
    Server,
    #[default]
    Auto,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub bucket_size: usize,
    pub concurrency: usize,
    pub resiliency: usize,
    pub max_record_age: Duration,
    pub provide_validity: Duration,
    pub provider_addr_ttl: Duration,
    pub network_timeout: Duration,
    pub query_timeout: Duration,
    pub max_retry_attempts: u32,
    pub retry_initial_backoff: Duration,
    pub retry_max_backoff: Duration,
    pub retry_backoff_factor: u32,
    pub refresh_interval: Duration,
    pub max_latency: Duration,
    pub usefulness_grace_period: Duration,
    pub filter_localhost_in_responses: bool,
    pub bootstrap_peers: Vec<PeerId>,
    pub auto_refresh: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Auto,
            bucket_size: 20,
            concurrency: 10,
            resiliency: 3,
            max_record_age: Duration::from_secs(24 * 3600),
            provide_validity: Duration::from_secs(48 * 3600),
            provider_addr_ttl: Duration::from_secs(24 * 3600),
            network_timeout: Duration::from_secs(30),
            query_timeout: Duration::from_secs(60),
            max_retry_attempts: 3,
            retry_initial_backoff: Duration::from_millis(500),
            retry_max_backoff: Duration::from_secs(30),
            retry_backoff_factor: 2,
            refresh_interval: Duration::from_secs(15 * 60),
            max_latency: Duration::from_millis(500),
            usefulness_grace_period: Duration::from_secs(60),
            filter_localhost_in_responses: true,
            bootstrap_peers: Vec::new(),
            auto_refresh: true,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_bootstrap_peers(mut self, peers: Vec<PeerId>) -> Self {
        self.bootstrap_peers = peers;
        self
    }

    pub fn serves_requests(&self) -> bool {
        !matches!(self.mode, Mode::Client)
    }
}
