// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Deterministic record payload hashing and signing, per the `/v/`
//! namespace's signed-record scheme.

use libp2p_identity::{Keypair, PeerId, PublicKey};

use crate::error::ValidationError;
use crate::record::Record;

const PAYLOAD_PREFIX: &[u8] = b"libp2p-record:";

/// Build the deterministic byte payload a `/v/` record's signature covers.
pub fn build_payload(key: &[u8], value: &[u8], time_received_ms: u64, author: &PeerId) -> Vec<u8> {
    let author_bytes = author.to_bytes();
    let mut out = Vec::with_capacity(
        PAYLOAD_PREFIX.len() + 4 + key.len() + 4 + value.len() + 8 + 4 + author_bytes.len(),
    );
    out.extend_from_slice(PAYLOAD_PREFIX);
    out.extend_from_slice(&(key.len() as u32).to_le_bytes());
    out.extend_from_slice(key);
    out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    out.extend_from_slice(value);
    out.extend_from_slice(&time_received_ms.to_le_bytes());
    out.extend_from_slice(&(author_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&author_bytes);
    out
}

/// Sign a new record authored by the holder of `keypair`.
pub fn sign_record(keypair: &Keypair, key: Vec<u8>, value: Vec<u8>, time_received_ms: u64) -> Result<Record, ValidationError> {
    let author = keypair.public().to_peer_id();
    let payload = build_payload(&key, &value, time_received_ms, &author);
    let signature = keypair
        .sign(&payload)
        .map_err(|e| ValidationError::Malformed(e.to_string()))?;
    Ok(Record::new(key, value, time_received_ms, author, signature))
}

/// Verify a record's signature against a supplied public key. The caller
/// is responsible for sourcing `public_key` (from the record's author peer
/// id, a key-book collaborator, or an embedded key), per spec §4.8.
pub fn verify_record(record: &Record, public_key: &PublicKey) -> Result<(), ValidationError> {
    if public_key.to_peer_id() != record.author {
        return Err(ValidationError::PeerIdMismatch);
    }
    let payload = build_payload(&record.key, &record.value, record.time_received, &record.author);
    if public_key.verify(&payload, &record.signature) {
        Ok(())
    } else {
        Err(ValidationError::SignatureMismatch)
    }
}
