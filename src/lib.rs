// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! A transport-agnostic Kademlia DHT core compatible with the Amino/IPFS
//! wire protocol (`/ipfs/kad/1.0.0`).
//!
//! This crate implements the routing table, iterative lookup engine,
//! record/provider stores and RPC state machine. It does not implement a
//! libp2p transport, stream multiplexer, or connection manager — those
//! are supplied by an embedder through the [`host`] trait boundary.
//!
//! Start with [`behaviour::Behaviour::new`] to construct a DHT instance,
//! spawn [`behaviour::Behaviour::run`] as a background task, and drive it
//! through the returned [`behaviour::KademliaHandle`].

pub mod behaviour;
pub mod config;
pub mod error;
pub mod handler;
pub mod host;
pub mod jobs;
pub mod kbucket;
pub mod key;
pub mod metrics;
pub mod protocol;
pub mod query;
pub mod record;
pub mod signing;
pub mod validator;

pub use behaviour::{Behaviour, KademliaHandle};
pub use config::{Config, Mode};
pub use error::{KadError, ProtocolError, RoutingError, TransportError, ValidationError};
pub use host::{ConnManager, Host, KeyBook, PeerAddrInfo, PeerLatencyMetrics, PeerStore, Stream};
pub use key::{Distance, Key};
pub use metrics::{KadMetrics, KadMetricsSnapshot};
pub use record::{MemoryProviderStore, MemoryStore, ProviderRecord, ProviderStore, Record, RecordStore};
pub use validator::NamespacedValidator;
