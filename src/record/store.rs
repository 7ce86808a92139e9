// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The validator-gated, in-memory record store.

use std::collections::HashMap;

use crate::error::ValidationError;
use crate::record::Record;
use crate::validator::{NamespacedValidator, PublicKeySource};

/// Point-in-time counters for the record store.
#[derive(Default, Clone, Debug)]
pub struct RecordStoreStats {
    pub records: usize,
    pub puts_accepted: u64,
    pub puts_rejected: u64,
}

/// Contract for the local record datastore (spec §4.3, §6.3).
pub trait RecordStore: Send {
    /// Accepts `record` only if it validates and the namespace validator's
    /// `select` prefers it over whatever is already stored, if anything.
    fn put(
        &mut self,
        record: Record,
        validator: &NamespacedValidator,
        keys: &dyn PublicKeySource,
        now_ms: u64,
    ) -> Result<(), ValidationError>;

    fn get(&self, key: &[u8]) -> Option<&Record>;
    fn has(&self, key: &[u8]) -> bool;
    fn delete(&mut self, key: &[u8]);
    fn keys(&self) -> Vec<Vec<u8>>;
    fn stats(&self) -> RecordStoreStats;
}

/// The only record-store backend this crate provides; persistent
/// backends are out of scope (spec §1) but must honor the same
/// validator-gated put and selection rule if one is added later.
#[derive(Default)]
pub struct MemoryStore {
    records: HashMap<Vec<u8>, Record>,
    stats: RecordStoreStats,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn put(
        &mut self,
        record: Record,
        validator: &NamespacedValidator,
        keys: &dyn PublicKeySource,
        now_ms: u64,
    ) -> Result<(), ValidationError> {
        if let Err(e) = validator.validate(&record, keys, now_ms) {
            self.stats.puts_rejected += 1;
            return Err(e);
        }

        match self.records.get(&record.key) {
            None => {
                self.records.insert(record.key.clone(), record);
            }
            Some(existing) => {
                let idx = validator.select(&record.key, &[existing, &record])?;
                if idx == 0 {
                    // Existing record preferred; the incoming one is a
                    // silent no-op, not an error.
                    self.stats.puts_accepted += 1;
                    return Ok(());
                }
                self.records.insert(record.key.clone(), record);
            }
        }
        self.stats.puts_accepted += 1;
        self.stats.records = self.records.len();
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Option<&Record> {
        self.records.get(key)
    }

    fn has(&self, key: &[u8]) -> bool {
        self.records.contains_key(key)
    }

    fn delete(&mut self, key: &[u8]) {
        self.records.remove(key);
        self.stats.records = self.records.len();
    }

    fn keys(&self) -> Vec<Vec<u8>> {
        self.records.keys().cloned().collect()
    }

    fn stats(&self) -> RecordStoreStats {
        let mut stats = self.stats.clone();
        stats.records = self.records.len();
        stats
    }
}
