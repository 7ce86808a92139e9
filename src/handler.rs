// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The RPC state machine: server-side handlers for the six message
//! types (spec §4.7 table) and the client's send-with-retry procedure.

use std::time::Duration;

use libp2p_identity::PeerId;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{KadError, ProtocolError, TransportError};
use crate::host::{Host, PeerStore};
use crate::kbucket::{EvictionGate, Table};
use crate::protocol::{ConnectionType, MessageType, WireMessage, WirePeer, WireRecord, PROTOCOL_ID};
use crate::record::{MemoryProviderStore, ProviderRecord, ProviderStore, Record, RecordStore};
use crate::validator::{NamespacedValidator, PublicKeySource};

/// Everything a server-side handler needs; borrowed for the duration of
/// one request.
pub struct HandlerContext<'a> {
    pub local_id: PeerId,
    pub table: &'a mut Table,
    pub gate: &'a dyn EvictionGate,
    pub records: &'a mut dyn RecordStore,
    pub providers: &'a mut MemoryProviderStore,
    pub peer_store: &'a dyn PeerStore,
    pub validator: &'a NamespacedValidator,
    pub keys: &'a dyn PublicKeySource,
    pub config: &'a Config,
    pub now_ms: u64,
}

/// `multiaddr`/CID parsing is out of scope (spec §1); this is a minimal
/// byte-level check against the two loopback prefixes the spec names,
/// not a general multiaddress parser.
fn is_localhost_addr(addr: &[u8]) -> bool {
    match addr.first() {
        Some(0x04) if addr.len() >= 5 => addr[1] == 127,
        Some(0x29) if addr.len() >= 17 => addr[1..17] == [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1],
        _ => false,
    }
}

fn peer_to_wire(ctx: &HandlerContext, peer: PeerId) -> WirePeer {
    let mut addrs = ctx
        .peer_store
        .get_peer(&peer)
        .map(|info| info.addrs)
        .unwrap_or_default();
    if ctx.config.filter_localhost_in_responses {
        addrs.retain(|a| !is_localhost_addr(a));
    }
    WirePeer {
        id: peer.to_bytes(),
        addrs,
        connection: ConnectionType::NotConnected,
    }
}

/// `nearest(key, bucket_size)` minus `exclude`, converted to wire peers.
fn closer_peers(ctx: &HandlerContext, key: &[u8], exclude: PeerId) -> Vec<WirePeer> {
    let target = crate::key::Key::new(key.to_vec());
    ctx.table
        .nearest(&target, ctx.config.bucket_size)
        .into_iter()
        .filter(|p| *p != exclude && *p != ctx.local_id)
        .map(|p| peer_to_wire(ctx, p))
        .collect()
}

pub(crate) fn wire_record_to_record(record: &WireRecord) -> Result<Record, ProtocolError> {
    let author = PeerId::from_bytes(&record.author).map_err(|_| ProtocolError::Malformed("bad author peer id".into()))?;
    let time_received: u64 = record
        .time_received
        .parse()
        .map_err(|_| ProtocolError::Malformed("time_received is not a u64".into()))?;
    Ok(Record::new(record.key.clone(), record.value.clone(), time_received, author, record.signature.clone()))
}

pub(crate) fn record_to_wire(record: &Record) -> WireRecord {
    WireRecord {
        key: record.key.clone(),
        value: record.value.clone(),
        time_received: record.time_received.to_string(),
        author: record.author.to_bytes(),
        signature: record.signature.clone(),
    }
}

/// Handle one incoming request. Returns `Ok(None)` for fire-and-forget
/// `ADD_PROVIDER`; every other variant returns a response to write back.
pub fn handle_request(ctx: &mut HandlerContext, sender: PeerId, request: WireMessage) -> Result<Option<WireMessage>, ProtocolError> {
    ctx.table.try_add(sender, true, true, ctx.gate);

    match request.r#type {
        MessageType::Ping => Ok(Some(WireMessage::new(MessageType::Ping))),

        MessageType::FindNode => {
            let key = request.key.ok_or(ProtocolError::MissingField("key"))?;
            let mut response = WireMessage::new(MessageType::FindNode);
            response.closer_peers = closer_peers(ctx, &key, sender);
            Ok(Some(response))
        }

        MessageType::GetValue => {
            let key = request.key.ok_or(ProtocolError::MissingField("key"))?;
            let mut response = WireMessage::new(MessageType::GetValue);
            response.record = ctx.records.get(&key).map(record_to_wire);
            response.closer_peers = closer_peers(ctx, &key, sender);
            Ok(Some(response))
        }

        MessageType::PutValue => {
            let key = request.key.ok_or(ProtocolError::MissingField("key"))?;
            let wire_record = request.record.ok_or(ProtocolError::MissingField("record"))?;
            let record = wire_record_to_record(&wire_record)?;
            if record.key != key {
                return Err(ProtocolError::Malformed("record key does not match message key".into()));
            }
            if let Err(e) = ctx.records.put(record, ctx.validator, ctx.keys, ctx.now_ms) {
                warn!(peer = %sender, error = %e, "rejected PUT_VALUE");
            }
            let mut response = WireMessage::new(MessageType::PutValue);
            response.key = Some(key);
            Ok(Some(response))
        }

        MessageType::GetProviders => {
            let key = request.key.ok_or(ProtocolError::MissingField("key"))?;
            let providers = ctx.providers.get_providers(&key);
            let mut response = WireMessage::new(MessageType::GetProviders);
            response.provider_peers = providers
                .into_iter()
                .map(|p| WirePeer {
                    id: p.provider.to_bytes(),
                    addrs: p.addresses,
                    connection: ConnectionType::NotConnected,
                })
                .collect();
            response.closer_peers = closer_peers(ctx, &key, sender);
            Ok(Some(response))
        }

        MessageType::AddProvider => {
            let key = request.key.ok_or(ProtocolError::MissingField("key"))?;
            if request.provider_peers.is_empty() {
                return Err(ProtocolError::MissingField("provider_peers"));
            }
            let expires_at = std::time::Instant::now() + ctx.config.provide_validity;
            for peer in request.provider_peers {
                let Ok(provider_id) = PeerId::from_bytes(&peer.id) else {
                    continue;
                };
                ctx.providers.add_provider(key.clone(), provider_id, peer.addrs, expires_at);
            }
            debug!(peer = %sender, "registered ADD_PROVIDER");
            Ok(None)
        }
    }
}

/// Convert a [`ProviderRecord`] list into the wire shape (kept separate
/// from the handler for use by the query coordinator's local-provider
/// short-circuit).
pub fn local_providers_to_wire(providers: &[ProviderRecord]) -> Vec<WirePeer> {
    providers
        .iter()
        .map(|p| WirePeer {
            id: p.provider.to_bytes(),
            addrs: p.addresses.clone(),
            connection: ConnectionType::NotConnected,
        })
        .collect()
}

/// Client-side send-with-retry (spec §4.7). Opens a fresh stream per
/// attempt; `ADD_PROVIDER` never reads a response.
pub async fn send_with_retry(host: &dyn Host, peer: PeerId, message: &WireMessage, config: &Config) -> Result<Option<WireMessage>, KadError> {
    if peer == host.id() {
        return Err(TransportError::SelfDial.into());
    }

    let expects_response = message.r#type != MessageType::AddProvider;
    let bytes = bytes::Bytes::from(message.encode()?);

    let mut attempt = 0u32;
    let mut backoff = config.retry_initial_backoff;
    let mut last_cause = TransportError::Other("no attempts made".into());

    loop {
        attempt += 1;
        match try_once(host, peer, bytes.clone(), expects_response, config.network_timeout).await {
            Ok(response) => return Ok(response),
            Err(cause) => {
                last_cause = cause.clone();
                if !cause.is_retryable() || attempt >= config.max_retry_attempts {
                    break;
                }
                tokio::time::sleep(backoff).await;
                backoff = std::cmp::min(backoff * config.retry_backoff_factor, config.retry_max_backoff);
            }
        }
    }

    Err(KadError::MaxRetriesExceeded {
        attempts: attempt,
        cause: last_cause,
    })
}

async fn try_once(host: &dyn Host, peer: PeerId, bytes: bytes::Bytes, expects_response: bool, timeout: Duration) -> Result<Option<WireMessage>, TransportError> {
    let mut stream = host.open_stream(peer, &[PROTOCOL_ID], timeout).await?;
    stream.write(bytes).await?;
    let response = if expects_response {
        let raw = tokio::time::timeout(timeout, stream.read())
            .await
            .map_err(|_| TransportError::Timeout)??;
        Some(WireMessage::decode(&raw).map_err(|e| TransportError::Other(e.to_string()))?)
    } else {
        None
    };
    stream.close().await;
    Ok(response)
}
