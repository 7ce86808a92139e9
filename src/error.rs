// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The error taxonomy: one typed enum per subsystem, composed into the
//! top-level [`KadError`] via `#[from]`.

use libp2p_identity::PeerId;
use thiserror::Error;

/// Errors raised by the record/provider validator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("record key has no recognized namespace prefix")]
    InvalidRecordType,
    #[error("record signature does not verify")]
    SignatureMismatch,
    #[error("no public key available to verify record from {0}")]
    MissingPublicKey(PeerId),
    #[error("record is older than the configured max age")]
    Expired,
    #[error("malformed record payload: {0}")]
    Malformed(String),
    #[error("select() called with an empty candidate list")]
    EmptyCandidates,
    #[error("/pk/ key peer id does not match the embedded public key")]
    PeerIdMismatch,
}

/// Errors raised while encoding/decoding wire messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown message type tag {0}")]
    UnknownMessageType(i32),
    #[error("required field `{0}` missing")]
    MissingField(&'static str),
    #[error("malformed protobuf payload: {0}")]
    Malformed(String),
    #[error("message exceeds maximum size")]
    TooLarge,
}

/// Errors raised by the host-facing transport collaborators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection refused")]
    ConnectionRefused,
    #[error("connection reset by peer")]
    ConnectionReset,
    #[error("broken pipe")]
    BrokenPipe,
    #[error("host is down")]
    HostDown,
    #[error("operation timed out")]
    Timeout,
    #[error("refusing to dial the local peer")]
    SelfDial,
    #[error("other network error: {0}")]
    Other(String),
}

impl TransportError {
    /// Whether a failed attempt using this cause should be retried. Only
    /// transient network-level failures qualify; `SelfDial` and `Other`
    /// (which also carries decode/protocol failures wrapped by the
    /// handler, see `handler::try_once`) are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectionRefused
                | TransportError::ConnectionReset
                | TransportError::BrokenPipe
                | TransportError::HostDown
                | TransportError::Timeout
        )
    }
}

/// Errors raised by routing-table operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("refusing to add the local peer id to the routing table")]
    RefusesLocalPeer,
    #[error("routing table has no peers")]
    NoPeers,
}

/// Top-level error type returned by the public surface.
#[derive(Debug, Error)]
pub enum KadError {
    #[error("the DHT has not been started")]
    NotStarted,
    #[error("the DHT has been closed")]
    Closed,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("operation timed out")]
    Timeout,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("bootstrap failed: {0}")]
    Bootstrap(String),
    #[error("exceeded {attempts} retry attempts, last cause: {cause}")]
    MaxRetriesExceeded { attempts: u32, cause: TransportError },
    #[error("operation was cancelled")]
    Cancelled,
    #[error("key not found")]
    NotFound,
    #[error("no providers found")]
    NoProviders,
    #[error("record rejected by the store: {0}")]
    SignedStoreRejected(ValidationError),
    #[error("all seeded peers were unreachable")]
    AllPeersUnreachable,
    #[error("command channel closed unexpectedly")]
    ChannelClosed,
}
