// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The Kademlia keyspace: keys, XOR distance and common-prefix-length.
//!
//! A [`Key`] is the identity function over whatever bytes the caller hands
//! in — a peer's multihash bytes, or a raw record/CID key. No hashing is
//! performed here; the DHT only ever compares bytes the caller already
//! produced.

use std::fmt;

use libp2p_identity::PeerId;
use uint::construct_uint;

construct_uint! {
    /// Unsigned 256-bit integer used to represent XOR distance, big-endian.
    pub struct U256(4);
}

/// Number of bytes considered when computing distance. Keys longer than
/// this are truncated to their first `KEY_LEN` bytes; shorter keys are
/// treated as zero-padded on the right (conceptually a right-aligned
/// distance space of `KEY_LEN * 8` bits).
pub const KEY_LEN: usize = 32;

/// Number of usable k-buckets: one per bit of the key space.
pub const NUM_BUCKETS: usize = KEY_LEN * 8;

/// A key in the Kademlia key space.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Key {
    bytes: Vec<u8>,
    fixed: U256,
}

impl Key {
    /// Build a key from raw bytes, the identity function on `bytes`.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let mut padded = [0u8; KEY_LEN];
        let n = bytes.len().min(KEY_LEN);
        padded[..n].copy_from_slice(&bytes[..n]);
        let fixed = U256::from_big_endian(&padded);
        Self { bytes, fixed }
    }

    /// Build a key from a peer id's raw (multihash) bytes.
    pub fn from_peer(peer: &PeerId) -> Self {
        Self::new(peer.to_bytes())
    }

    /// The original, unpadded byte representation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The bit length used for CPL purposes: `KEY_LEN * 8` unless the
    /// original key is shorter, in which case its own bit length.
    fn bit_length(&self) -> u32 {
        (self.bytes.len().min(KEY_LEN) as u32) * 8
    }

    /// XOR distance between `self` and `other`, as an unsigned big-endian
    /// integer over `KEY_LEN` bytes.
    pub fn distance(&self, other: &Key) -> Distance {
        Distance(self.fixed ^ other.fixed)
    }

    /// Common-prefix-length: number of leading bits `self` and `other`
    /// agree on. If the two keys are equal, returns the bit length of
    /// `self` (per spec, not `KEY_LEN * 8`, so a key never collides with
    /// itself into a bucket it cannot occupy).
    pub fn cpl(&self, other: &Key) -> u32 {
        let zeros = self.distance(other).leading_zero_bits();
        if zeros >= NUM_BUCKETS as u32 {
            self.bit_length()
        } else {
            zeros
        }
    }

    /// Normalized distance in `[0, 1]`: the XOR distance divided by
    /// `2^(KEY_LEN*8)`.
    pub fn normalized_distance(&self, other: &Key) -> f64 {
        let distance = self.distance(other);
        let mut acc = 0.0f64;
        let mut scale = 1.0f64;
        // Accumulate the top ~53 bits of the 256-bit distance as a
        // binary fraction; beyond that precision is lost to f64 anyway.
        for word in distance.0 .0.iter().rev() {
            scale /= 2f64.powi(64);
            acc += (*word as f64) * scale;
        }
        acc.clamp(0.0, 1.0)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", hex_prefix(&self.bytes))
    }
}

fn hex_prefix(bytes: &[u8]) -> String {
    let n = bytes.len().min(8);
    bytes[..n].iter().map(|b| format!("{b:02x}")).collect()
}

/// XOR distance between two [`Key`]s, ordered as an unsigned big-endian
/// integer (smaller distance sorts first).
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Ord)]
pub struct Distance(pub U256);

impl Distance {
    /// Number of leading zero bits, i.e. the common-prefix-length implied
    /// by this distance.
    pub fn leading_zero_bits(&self) -> u32 {
        self.0.leading_zeros()
    }

    /// The bucket index a peer at this distance from the local key
    /// belongs in: `NUM_BUCKETS - 1 - leading_zero_bits`, saturating so
    /// a zero distance (the local key itself) maps to bucket 0 rather
    /// than underflowing. Callers must special-case a zero distance
    /// (the local peer) themselves; see [`crate::kbucket::Table`].
    pub fn bucket_index(&self) -> usize {
        let zeros = self.leading_zero_bits();
        (NUM_BUCKETS as u32 - 1).saturating_sub(zeros) as usize
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl fmt::Debug for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Distance({:x})", self.0)
    }
}


#[cfg(test)]
mod quickcheck_tests {
    use super::*;
    use quickcheck::quickcheck;

    quickcheck! {
        fn prop_distance_is_symmetric(a: Vec<u8>, b: Vec<u8>) -> bool {
            let ka = Key::new(a);
            let kb = Key::new(b);
            ka.distance(&kb) == kb.distance(&ka)
        }

        fn prop_distance_to_self_is_always_zero(a: Vec<u8>) -> bool {
            let k = Key::new(a);
            k.distance(&k).is_zero()
        }

        fn prop_bucket_index_never_exceeds_num_buckets(a: Vec<u8>, b: Vec<u8>) -> bool {
            let ka = Key::new(a);
            let kb = Key::new(b);
            ka.distance(&kb).bucket_index() < NUM_BUCKETS
        }

        fn prop_distance_total_order_is_antisymmetric(a: Vec<u8>, b: Vec<u8>, c: Vec<u8>) -> bool {
            let (ka, kb, kc) = (Key::new(a), Key::new(b), Key::new(c));
            let (dab, dac) = (ka.distance(&kb), ka.distance(&kc));
            // A total order never has two elements both strictly preferred
            // to each other.
            !(dab < dac && dac < dab)
        }
    }
}
