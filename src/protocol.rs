// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Wire encoding for the `/ipfs/kad/1.0.0` message schema.
//!
//! The protobuf shape mirrors `dht.proto` from go-libp2p-kad-dht /
//! `libp2p-kad`, extended with `author`/`signature` fields on `Record` to
//! carry the signed-record scheme from spec §4.8. There is no `.proto`
//! source checked in: `prost`/`quick-protobuf-codegen` need `protoc` at
//! build time, which this environment does not have, so the generated
//! shape is written by hand against `quick_protobuf`'s reader/writer API.

use quick_protobuf::{BytesReader, MessageRead, MessageWrite, Result as ProtoResult, Writer, WriterBackend};

use crate::error::ProtocolError;

pub const PROTOCOL_ID: &str = "/ipfs/kad/1.0.0";

/// Default cap on a single encoded message, matching the Amino DHT's
/// practical limit for closer/provider peer lists.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

fn varint_size(v: u64) -> usize {
    if v == 0 {
        return 1;
    }
    let bits = 64 - v.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

fn len_prefixed_size(len: usize) -> usize {
    varint_size(len as u64) + len
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    PutValue = 0,
    GetValue = 1,
    AddProvider = 2,
    GetProviders = 3,
    FindNode = 4,
    Ping = 5,
}

impl MessageType {
    fn from_i32(v: i32) -> Result<Self, ProtocolError> {
        match v {
            0 => Ok(MessageType::PutValue),
            1 => Ok(MessageType::GetValue),
            2 => Ok(MessageType::AddProvider),
            3 => Ok(MessageType::GetProviders),
            4 => Ok(MessageType::FindNode),
            5 => Ok(MessageType::Ping),
            other => Err(ProtocolError::UnknownMessageType(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    NotConnected = 0,
    Connected = 1,
    CanConnect = 2,
    CannotConnect = 3,
}

impl ConnectionType {
    fn from_i32(v: i32) -> Self {
        match v {
            1 => ConnectionType::Connected,
            2 => ConnectionType::CanConnect,
            3 => ConnectionType::CannotConnect,
            _ => ConnectionType::NotConnected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WirePeer {
    pub id: Vec<u8>,
    pub addrs: Vec<Vec<u8>>,
    pub connection: ConnectionType,
}

impl MessageWrite for WirePeer {
    fn get_size(&self) -> usize {
        let mut size = 1 + len_prefixed_size(self.id.len());
        for addr in &self.addrs {
            size += 1 + len_prefixed_size(addr.len());
        }
        if self.connection != ConnectionType::NotConnected {
            size += 1 + varint_size(self.connection as u64);
        }
        size
    }

    fn write_message<W: WriterBackend>(&self, w: &mut Writer<W>) -> ProtoResult<()> {
        w.write_with_tag(10, |w| w.write_bytes(&self.id))?;
        for addr in &self.addrs {
            w.write_with_tag(18, |w| w.write_bytes(addr))?;
        }
        if self.connection != ConnectionType::NotConnected {
            w.write_with_tag(24, |w| w.write_int32(self.connection as i32))?;
        }
        Ok(())
    }
}

impl<'a> MessageRead<'a> for WirePeer {
    fn from_reader(r: &mut BytesReader, bytes: &'a [u8]) -> ProtoResult<Self> {
        let mut msg = WirePeer {
            id: Vec::new(),
            addrs: Vec::new(),
            connection: ConnectionType::NotConnected,
        };
        while !r.is_eof() {
            let tag = r.next_tag(bytes)?;
            match tag {
                10 => msg.id = r.read_bytes(bytes)?.to_vec(),
                18 => msg.addrs.push(r.read_bytes(bytes)?.to_vec()),
                24 => msg.connection = ConnectionType::from_i32(r.read_int32(bytes)?),
                _ => r.read_unknown(bytes, tag)?,
            };
        }
        Ok(msg)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireRecord {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub time_received: String,
    pub author: Vec<u8>,
    pub signature: Vec<u8>,
}

impl MessageWrite for WireRecord {
    fn get_size(&self) -> usize {
        1 + len_prefixed_size(self.key.len())
            + 1 + len_prefixed_size(self.value.len())
            + if self.time_received.is_empty() { 0 } else { 1 + len_prefixed_size(self.time_received.len()) }
            + if self.author.is_empty() { 0 } else { 1 + len_prefixed_size(self.author.len()) }
            + if self.signature.is_empty() { 0 } else { 1 + len_prefixed_size(self.signature.len()) }
    }

    fn write_message<W: WriterBackend>(&self, w: &mut Writer<W>) -> ProtoResult<()> {
        w.write_with_tag(10, |w| w.write_bytes(&self.key))?;
        w.write_with_tag(18, |w| w.write_bytes(&self.value))?;
        if !self.time_received.is_empty() {
            w.write_with_tag(42, |w| w.write_string(&self.time_received))?;
        }
        if !self.author.is_empty() {
            w.write_with_tag(50, |w| w.write_bytes(&self.author))?;
        }
        if !self.signature.is_empty() {
            w.write_with_tag(58, |w| w.write_bytes(&self.signature))?;
        }
        Ok(())
    }
}

impl<'a> MessageRead<'a> for WireRecord {
    fn from_reader(r: &mut BytesReader, bytes: &'a [u8]) -> ProtoResult<Self> {
        let mut msg = WireRecord {
            key: Vec::new(),
            value: Vec::new(),
            time_received: String::new(),
            author: Vec::new(),
            signature: Vec::new(),
        };
        while !r.is_eof() {
            let tag = r.next_tag(bytes)?;
            match tag {
                10 => msg.key = r.read_bytes(bytes)?.to_vec(),
                18 => msg.value = r.read_bytes(bytes)?.to_vec(),
                42 => msg.time_received = r.read_string(bytes)?.to_string(),
                50 => msg.author = r.read_bytes(bytes)?.to_vec(),
                58 => msg.signature = r.read_bytes(bytes)?.to_vec(),
                _ => r.read_unknown(bytes, tag)?,
            };
        }
        Ok(msg)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub r#type: MessageType,
    pub key: Option<Vec<u8>>,
    pub record: Option<WireRecord>,
    pub closer_peers: Vec<WirePeer>,
    pub provider_peers: Vec<WirePeer>,
    pub cluster_level_raw: i32,
}

impl WireMessage {
    pub fn new(r#type: MessageType) -> Self {
        Self {
            r#type,
            key: None,
            record: None,
            closer_peers: Vec::new(),
            provider_peers: Vec::new(),
            cluster_level_raw: 0,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = Vec::with_capacity(self.get_size());
        let mut writer = Writer::new(&mut buf);
        self.write_message(&mut writer)
            .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        if buf.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::TooLarge);
        }
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::TooLarge);
        }
        let mut reader = BytesReader::from_bytes(bytes);
        parse_fields(&mut reader, bytes)
    }
}

/// Reads the tag/value stream into a [`WireMessage`], enforcing that the
/// `type` field (§6.1) is present and names a known [`MessageType`]. Shared
/// by [`WireMessage::decode`] and the [`MessageRead`] impl below so both
/// paths reject a missing or out-of-range type tag the same way, rather
/// than defaulting it to `Ping`.
fn parse_fields(r: &mut BytesReader, bytes: &[u8]) -> Result<WireMessage, ProtocolError> {
    let mut msg = WireMessage::new(MessageType::Ping);
    let mut type_raw: Option<i32> = None;
    while !r.is_eof() {
        let tag = r.next_tag(bytes).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        match tag {
            8 => type_raw = Some(r.read_int32(bytes).map_err(|e| ProtocolError::Malformed(e.to_string()))?),
            18 => msg.key = Some(r.read_bytes(bytes).map_err(|e| ProtocolError::Malformed(e.to_string()))?.to_vec()),
            26 => msg.record = Some(r.read_message::<WireRecord>(bytes).map_err(|e| ProtocolError::Malformed(e.to_string()))?),
            66 => msg.closer_peers.push(r.read_message::<WirePeer>(bytes).map_err(|e| ProtocolError::Malformed(e.to_string()))?),
            74 => msg.provider_peers.push(r.read_message::<WirePeer>(bytes).map_err(|e| ProtocolError::Malformed(e.to_string()))?),
            80 => msg.cluster_level_raw = r.read_int32(bytes).map_err(|e| ProtocolError::Malformed(e.to_string()))?,
            _ => r.read_unknown(bytes, tag).map_err(|e| ProtocolError::Malformed(e.to_string()))?,
        };
    }
    let raw = type_raw.ok_or(ProtocolError::MissingField("type"))?;
    msg.r#type = MessageType::from_i32(raw)?;
    Ok(msg)
}

impl MessageWrite for WireMessage {
    fn get_size(&self) -> usize {
        1 + varint_size(self.r#type as u64)
            + self.key.as_ref().map_or(0, |k| 1 + len_prefixed_size(k.len()))
            + self.record.as_ref().map_or(0, |r| 1 + len_prefixed_size(r.get_size()))
            + self.closer_peers.iter().map(|p| 1 + len_prefixed_size(p.get_size())).sum::<usize>()
            + self.provider_peers.iter().map(|p| 1 + len_prefixed_size(p.get_size())).sum::<usize>()
            + if self.cluster_level_raw == 0 { 0 } else { 1 + varint_size(self.cluster_level_raw as u64) }
    }

    fn write_message<W: WriterBackend>(&self, w: &mut Writer<W>) -> ProtoResult<()> {
        w.write_with_tag(8, |w| w.write_int32(self.r#type as i32))?;
        if let Some(ref key) = self.key {
            w.write_with_tag(18, |w| w.write_bytes(key))?;
        }
        if let Some(ref record) = self.record {
            w.write_with_tag(26, |w| w.write_message(record))?;
        }
        for peer in &self.closer_peers {
            w.write_with_tag(66, |w| w.write_message(peer))?;
        }
        for peer in &self.provider_peers {
            w.write_with_tag(74, |w| w.write_message(peer))?;
        }
        if self.cluster_level_raw != 0 {
            w.write_with_tag(80, |w| w.write_int32(self.cluster_level_raw))?;
        }
        Ok(())
    }
}

impl<'a> MessageRead<'a> for WireMessage {
    fn from_reader(r: &mut BytesReader, bytes: &'a [u8]) -> ProtoResult<Self> {
        parse_fields(r, bytes).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()).into())
    }
}
