// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Namespaced record validation and selection.
//!
//! Validators are a closed sum type, not a trait object hierarchy: the
//! set of namespaces is fixed by this crate (`/pk/`, `/ipns/`, `/v/`), and
//! [`NamespacedValidator`] is a registry mapping the key's namespace
//! component to the matching variant, per the design note on replacing
//! runtime dynamic dispatch with a concrete sum type.

use std::time::Duration;

use libp2p_identity::{PeerId, PublicKey};

use crate::error::ValidationError;
use crate::record::Record;

/// Resolves a peer's public key, e.g. from an address book or an
/// out-of-band directory. Implemented by the host-facing `KeyBook`.
pub trait PublicKeySource {
    fn public_key(&self, peer: &PeerId) -> Option<PublicKey>;
}

/// No-op key source for contexts (such as pure `/pk/` validation) that
/// never need to resolve a key externally.
pub struct NoKeys;

impl PublicKeySource for NoKeys {
    fn public_key(&self, _peer: &PeerId) -> Option<PublicKey> {
        None
    }
}

/// The key's namespace is always ASCII (`pk`, `ipns`, `v`, ...); only the
/// id component following it may be raw, non-UTF8 multihash bytes.
fn namespace_of(key: &[u8]) -> Option<&str> {
    let rest = key.strip_prefix(b"/")?;
    let end = rest.iter().position(|b| *b == b'/').unwrap_or(rest.len());
    std::str::from_utf8(&rest[..end]).ok()
}

/// Byte offset of the id component: the position right after the second
/// `/` in `/<namespace>/<id...>`, or `None` if the key has no id part.
fn id_component(key: &[u8]) -> Option<&[u8]> {
    let rest = key.strip_prefix(b"/")?;
    let ns_end = rest.iter().position(|b| *b == b'/')?;
    Some(&rest[ns_end + 1..])
}

/// Parse a `/pk/<id>` or `/ipns/<id>` key's peer-id component, accepting
/// both base58btc text and raw multihash bytes (Open Question resolution
/// in spec §9: both forms must validate if they resolve to the same id).
fn parse_embedded_peer_id(key: &[u8]) -> Result<PeerId, ValidationError> {
    let id_part = id_component(key).ok_or_else(|| ValidationError::Malformed("missing key id component".into()))?;

    if let Ok(text) = std::str::from_utf8(id_part) {
        if let Ok(peer) = text.parse::<PeerId>() {
            return Ok(peer);
        }
    }
    PeerId::from_bytes(id_part).map_err(|_| ValidationError::Malformed("id component is neither base58 nor raw multihash bytes".into()))
}

/// `Validator::select` preference comparator output.
pub type SelectResult = Result<usize, ValidationError>;

/// `/pk/<peer_id>` validator: the value is a protobuf-marshaled public key.
#[derive(Default, Clone, Copy, Debug)]
pub struct PublicKeyValidator;

impl PublicKeyValidator {
    pub fn validate(&self, key: &[u8], value: &[u8]) -> Result<(), ValidationError> {
        let expected = parse_embedded_peer_id(key)?;
        let public_key = PublicKey::try_decode_protobuf(value)
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;
        if public_key.to_peer_id() == expected {
            Ok(())
        } else {
            Err(ValidationError::PeerIdMismatch)
        }
    }

    /// Any value that validates is acceptable; the first one wins, since a
    /// public key for a given peer id is unique up to encoding.
    pub fn select(&self, _key: &[u8], values: &[&[u8]]) -> SelectResult {
        if values.is_empty() {
            return Err(ValidationError::EmptyCandidates);
        }
        Ok(0)
    }
}

/// `/ipns/<peer_id>` validator.
///
/// IPNS-specific validation logic beyond this abstract contract is a
/// spec non-goal; this implements the sequence/EOL selection algorithm
/// structurally, against the locally-defined [`IpnsEntry`] wire shape
/// rather than the full upstream CBOR record (which would require a
/// dependency this crate's scope does not otherwise need).
#[derive(Default, Clone, Copy, Debug)]
pub struct IpnsValidator;

/// A minimal IPNS entry: sequence number, RFC3339 validity deadline, and
/// a signature. `validity_type` is always EOL (0) in this implementation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IpnsEntry {
    pub sequence: u64,
    pub validity: String,
    pub value: Vec<u8>,
    pub signature: Vec<u8>,
    pub embedded_public_key: Option<Vec<u8>>,
}

impl IpnsEntry {
    /// Encode to the locally-defined wire shape this validator expects
    /// as a record's `value` bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.sequence.to_le_bytes());
        let validity = self.validity.as_bytes();
        out.extend_from_slice(&(validity.len() as u32).to_le_bytes());
        out.extend_from_slice(validity);
        out.extend_from_slice(&(self.value.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.value);
        out.extend_from_slice(&(self.signature.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.signature);
        match &self.embedded_public_key {
            Some(k) => {
                out.extend_from_slice(&(k.len() as u32).to_le_bytes());
                out.extend_from_slice(k);
            }
            None => out.extend_from_slice(&0u32.to_le_bytes()),
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ValidationError> {
        let err = || ValidationError::Malformed("truncated ipns entry".into());
        let mut pos = 0usize;
        let take = |pos: &mut usize, n: usize| -> Result<&[u8], ValidationError> {
            let end = pos.checked_add(n).ok_or_else(err)?;
            let slice = bytes.get(*pos..end).ok_or_else(err)?;
            *pos = end;
            Ok(slice)
        };
        let sequence = u64::from_le_bytes(take(&mut pos, 8)?.try_into().map_err(|_| err())?);
        let vlen = u32::from_le_bytes(take(&mut pos, 4)?.try_into().map_err(|_| err())?) as usize;
        let validity = String::from_utf8(take(&mut pos, vlen)?.to_vec()).map_err(|_| err())?;
        let val_len = u32::from_le_bytes(take(&mut pos, 4)?.try_into().map_err(|_| err())?) as usize;
        let value = take(&mut pos, val_len)?.to_vec();
        let sig_len = u32::from_le_bytes(take(&mut pos, 4)?.try_into().map_err(|_| err())?) as usize;
        let signature = take(&mut pos, sig_len)?.to_vec();
        let key_len = u32::from_le_bytes(take(&mut pos, 4)?.try_into().map_err(|_| err())?) as usize;
        let embedded_public_key = if key_len == 0 {
            None
        } else {
            Some(take(&mut pos, key_len)?.to_vec())
        };
        Ok(Self {
            sequence,
            validity,
            value,
            signature,
            embedded_public_key,
        })
    }

    fn signed_payload(&self) -> Vec<u8> {
        let mut out = b"ipns-signature:".to_vec();
        out.extend_from_slice(self.value.as_slice());
        out.extend_from_slice(self.validity.as_bytes());
        out.extend_from_slice(b"0");
        out
    }
}

impl IpnsValidator {
    pub fn validate(&self, key: &[u8], value: &[u8], keys: &dyn PublicKeySource) -> Result<(), ValidationError> {
        let peer = parse_embedded_peer_id(key)?;
        let entry = IpnsEntry::decode(value)?;

        let public_key = match &entry.embedded_public_key {
            Some(bytes) => PublicKey::try_decode_protobuf(bytes).map_err(|e| ValidationError::Malformed(e.to_string()))?,
            None => keys
                .public_key(&peer)
                .or_else(|| public_key_from_peer_id(&peer))
                .ok_or(ValidationError::MissingPublicKey(peer))?,
        };

        let expires = parse_rfc3339(&entry.validity)?;
        if expires <= now_unix_seconds() {
            return Err(ValidationError::Expired);
        }

        if !public_key.verify(&entry.signed_payload(), &entry.signature) {
            return Err(ValidationError::SignatureMismatch);
        }
        Ok(())
    }

    /// Higher sequence wins; tie broken by later EOL; tie broken by
    /// lexicographically larger value.
    pub fn select(&self, _key: &[u8], values: &[&[u8]]) -> SelectResult {
        if values.is_empty() {
            return Err(ValidationError::EmptyCandidates);
        }
        let mut best = 0usize;
        let mut best_entry = IpnsEntry::decode(values[0])?;
        for (idx, raw) in values.iter().enumerate().skip(1) {
            let candidate = IpnsEntry::decode(raw)?;
            if is_preferred(&candidate, &best_entry) {
                best = idx;
                best_entry = candidate;
            }
        }
        Ok(best)
    }
}

fn is_preferred(candidate: &IpnsEntry, incumbent: &IpnsEntry) -> bool {
    if candidate.sequence != incumbent.sequence {
        return candidate.sequence > incumbent.sequence;
    }
    if candidate.validity != incumbent.validity {
        return candidate.validity > incumbent.validity;
    }
    candidate.value > incumbent.value
}

fn public_key_from_peer_id(_peer: &PeerId) -> Option<PublicKey> {
    // Ed25519/secp256k1 peer ids are hashes, not identity-encoded keys,
    // so the key generally cannot be recovered from the id alone.
    None
}

fn parse_rfc3339(s: &str) -> Result<u64, ValidationError> {
    // Minimal RFC3339 `YYYY-MM-DDTHH:MM:SSZ` parser, sufficient for EOL
    // comparison; this crate does not depend on a full date/time library.
    let bytes = s.as_bytes();
    if bytes.len() < 20 || bytes[4] != b'-' || bytes[7] != b'-' || bytes[10] != b'T' {
        return Err(ValidationError::Malformed("validity is not RFC3339".into()));
    }
    let year: i64 = s[0..4].parse().map_err(|_| ValidationError::Malformed("bad year".into()))?;
    let month: i64 = s[5..7].parse().map_err(|_| ValidationError::Malformed("bad month".into()))?;
    let day: i64 = s[8..10].parse().map_err(|_| ValidationError::Malformed("bad day".into()))?;
    let hour: i64 = s[11..13].parse().map_err(|_| ValidationError::Malformed("bad hour".into()))?;
    let minute: i64 = s[14..16].parse().map_err(|_| ValidationError::Malformed("bad minute".into()))?;
    let second: i64 = s[17..19].parse().map_err(|_| ValidationError::Malformed("bad second".into()))?;

    // Days since epoch via a civil-calendar algorithm (Howard Hinnant's).
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as i64;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    let days_since_epoch = era * 146097 + doe - 719468;

    let seconds = days_since_epoch * 86400 + hour * 3600 + minute * 60 + second;
    Ok(seconds.max(0) as u64)
}

fn now_unix_seconds() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// `/v/<path>` validator: structural validation only; the signature check
/// lives in [`crate::signing`], since a generic `/v/` record also carries
/// an `author`/`signature` pair at the `Record` level (spec §4.8).
#[derive(Default, Clone, Copy, Debug)]
pub struct GenericValidator {
    pub max_record_age: Duration,
}

impl GenericValidator {
    pub fn new(max_record_age: Duration) -> Self {
        Self { max_record_age }
    }

    pub fn validate_record(&self, record: &Record, keys: &dyn PublicKeySource, now_ms: u64) -> Result<(), ValidationError> {
        let age_ms = now_ms.saturating_sub(record.time_received);
        if age_ms > self.max_record_age.as_millis() as u64 {
            return Err(ValidationError::Expired);
        }
        let public_key = keys
            .public_key(&record.author)
            .or_else(|| public_key_from_peer_id(&record.author))
            .ok_or(ValidationError::MissingPublicKey(record.author))?;
        crate::signing::verify_record(record, &public_key)
    }

    /// Largest `time_received` wins.
    pub fn select_records(&self, records: &[&Record]) -> SelectResult {
        records
            .iter()
            .enumerate()
            .max_by_key(|(_, r)| r.time_received)
            .map(|(idx, _)| idx)
            .ok_or(ValidationError::EmptyCandidates)
    }
}

/// Registry dispatching on the first path component of a record key.
pub struct NamespacedValidator {
    pub pk: PublicKeyValidator,
    pub ipns: IpnsValidator,
    pub generic: GenericValidator,
}

impl NamespacedValidator {
    pub fn new(max_record_age: Duration) -> Self {
        Self {
            pk: PublicKeyValidator,
            ipns: IpnsValidator,
            generic: GenericValidator::new(max_record_age),
        }
    }

    /// Validate a full record against its namespace's rules.
    pub fn validate(&self, record: &Record, keys: &dyn PublicKeySource, now_ms: u64) -> Result<(), ValidationError> {
        match namespace_of(&record.key) {
            Some("pk") => self.pk.validate(&record.key, &record.value),
            Some("ipns") => self.ipns.validate(&record.key, &record.value, keys),
            Some("v") => self.generic.validate_record(record, keys, now_ms),
            _ => Err(ValidationError::InvalidRecordType),
        }
    }

    /// Select the preferred record among candidates sharing a key.
    pub fn select(&self, key: &[u8], candidates: &[&Record]) -> SelectResult {
        match namespace_of(key) {
            Some("pk") => {
                let values: Vec<&[u8]> = candidates.iter().map(|r| r.value.as_slice()).collect();
                self.pk.select(key, &values)
            }
            Some("ipns") => {
                let values: Vec<&[u8]> = candidates.iter().map(|r| r.value.as_slice()).collect();
                self.ipns.select(key, &values)
            }
            Some("v") => self.generic.select_records(candidates),
            _ => Err(ValidationError::InvalidRecordType),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libp2p_identity::Keypair;

    #[test]
    fn pk_validator_accepts_base58_and_raw_bytes_forms() {
        let keypair = Keypair::generate_ed25519();
        let peer = keypair.public().to_peer_id();
        let value = keypair.public().encode_protobuf();

        let b58_key = format!("/pk/{peer}").into_bytes();
        PublicKeyValidator.validate(&b58_key, &value).unwrap();

        let mut raw_key = b"/pk/".to_vec();
        raw_key.extend_from_slice(&peer.to_bytes());
        PublicKeyValidator.validate(&raw_key, &value).unwrap();
    }

    #[test]
    fn pk_validator_rejects_mismatched_peer() {
        let keypair = Keypair::generate_ed25519();
        let other = Keypair::generate_ed25519();
        let key = format!("/pk/{}", other.public().to_peer_id()).into_bytes();
        let value = keypair.public().encode_protobuf();
        assert!(PublicKeyValidator.validate(&key, &value).is_err());
    }

    #[test]
    fn generic_validator_rejects_stale_records() {
        let keypair = Keypair::generate_ed25519();
        let record = crate::signing::sign_record(&keypair, b"/v/x".to_vec(), b"y".to_vec(), 0).unwrap();
        struct OneKey(PublicKey);
        impl PublicKeySource for OneKey {
            fn public_key(&self, _p: &PeerId) -> Option<PublicKey> {
                Some(self.0.clone())
            }
        }
        let validator = GenericValidator::new(Duration::from_millis(10));
        let keys = OneKey(keypair.public());
        assert!(validator.validate_record(&record, &keys, 10_000).is_err());
        assert!(validator.validate_record(&record, &keys, 5).is_ok());
    }

    #[test]
    fn generic_select_prefers_largest_time_received() {
        let keypair = Keypair::generate_ed25519();
        let older = crate::signing::sign_record(&keypair, b"/v/x".to_vec(), b"a".to_vec(), 1).unwrap();
        let newer = crate::signing::sign_record(&keypair, b"/v/x".to_vec(), b"b".to_vec(), 2).unwrap();
        let validator = GenericValidator::new(Duration::from_secs(86400));
        let idx = validator.select_records(&[&older, &newer]).unwrap();
        assert_eq!(idx, 1);
    }

    #[test]
    fn unknown_namespace_is_rejected() {
        assert_eq!(namespace_of(b"/unknown/x"), Some("unknown"));
        let registry = NamespacedValidator::new(Duration::from_secs(86400));
        let keypair = Keypair::generate_ed25519();
        let record = crate::signing::sign_record(&keypair, b"/unknown/x".to_vec(), b"y".to_vec(), 0).unwrap();
        assert_eq!(registry.validate(&record, &NoKeys, 0), Err(ValidationError::InvalidRecordType));
    }
}
