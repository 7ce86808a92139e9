// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The content-provider store: per content key, a set of providers keyed
//! by provider peer id, each with an expiry.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use libp2p_identity::PeerId;

/// One provider's advertisement for a content key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderRecord {
    pub content_key: Vec<u8>,
    pub provider: PeerId,
    pub addresses: Vec<Vec<u8>>,
    pub expires_at: Instant,
}

/// Contract for the provider store (spec §4.4).
pub trait ProviderStore: Send {
    fn add_provider(&mut self, content_key: Vec<u8>, provider: PeerId, addresses: Vec<Vec<u8>>, expires_at: Instant);
    /// Non-expired providers for `content_key`; expired entries are
    /// lazily dropped as a side effect.
    fn get_providers(&mut self, content_key: &[u8]) -> Vec<ProviderRecord>;
    fn remove_provider(&mut self, content_key: &[u8], provider: &PeerId);
    fn clear(&mut self);
}

/// In-memory provider store; the only backend this crate provides
/// (persistent backends are out of scope, spec §1).
#[derive(Default)]
pub struct MemoryProviderStore {
    providers: HashMap<Vec<u8>, Vec<ProviderRecord>>,
}

impl MemoryProviderStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn prune_expired(entries: &mut Vec<ProviderRecord>, now: Instant) {
        entries.retain(|p| p.expires_at > now);
    }
}

impl ProviderStore for MemoryProviderStore {
    fn add_provider(&mut self, content_key: Vec<u8>, provider: PeerId, addresses: Vec<Vec<u8>>, expires_at: Instant) {
        let entries = self.providers.entry(content_key.clone()).or_default();
        if let Some(existing) = entries.iter_mut().find(|p| p.provider == provider) {
            existing.addresses = addresses;
            existing.expires_at = expires_at;
        } else {
            entries.push(ProviderRecord {
                content_key,
                provider,
                addresses,
                expires_at,
            });
        }
    }

    fn get_providers(&mut self, content_key: &[u8]) -> Vec<ProviderRecord> {
        let now = Instant::now();
        match self.providers.get_mut(content_key) {
            Some(entries) => {
                Self::prune_expired(entries, now);
                entries.clone()
            }
            None => Vec::new(),
        }
    }

    fn remove_provider(&mut self, content_key: &[u8], provider: &PeerId) {
        if let Some(entries) = self.providers.get_mut(content_key) {
            entries.retain(|p| &p.provider != provider);
        }
    }

    fn clear(&mut self) {
        self.providers.clear();
    }
}

/// Default provider-record TTL: 48 hours.
pub const DEFAULT_PROVIDE_VALIDITY: Duration = Duration::from_secs(48 * 3600);
