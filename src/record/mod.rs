// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Signed value records and the in-memory record store.

mod provider;
mod store;

pub use provider::{ProviderRecord, ProviderStore, MemoryProviderStore};
pub use store::{MemoryStore, RecordStore, RecordStoreStats};

use libp2p_identity::PeerId;

/// A signed value record, namespaced by the first path component of its key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Monotonic milliseconds since the UNIX epoch, assigned on ingress.
    pub time_received: u64,
    pub author: PeerId,
    pub signature: Vec<u8>,
}

impl Record {
    pub fn new(key: Vec<u8>, value: Vec<u8>, time_received: u64, author: PeerId, signature: Vec<u8>) -> Self {
        Self {
            key,
            value,
            time_received,
            author,
            signature,
        }
    }
}
