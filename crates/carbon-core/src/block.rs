use crate::{
    constants::{HEADER_BYTES, NONCE_OFFSET},
    payload::Entry,
    sha256, Hash, ZERO_HASH,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub payload: Vec<Entry>,
    #[serde(with = "crate::hash_hex")]
    pub previous_hash: Hash,
    pub nonce: u64,
    #[serde(with = "crate::hash_hex")]
    pub hash: Hash,
}

impl Block {
    /// Index 0, zero previous hash, empty payload, nonce 0.
    pub fn genesis(timestamp: u64) -> Self {
        Candidate::new(0, ZERO_HASH, timestamp, Vec::new()).seal(0)
    }

    /// Digest over every field except `hash`, recomputed from scratch.
    pub fn compute_hash(&self) -> Hash {
        let header = header_bytes(
            self.index,
            &self.previous_hash,
            &payload_root(&self.payload),
            self.timestamp,
            self.nonce,
        );
        sha256(&header)
    }

    pub fn is_internally_consistent(&self) -> bool {
        self.compute_hash() == self.hash
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

/// Canonical header layout: little-endian integers, raw digests, nonce last.
fn header_bytes(
    index: u64,
    previous_hash: &Hash,
    payload_root: &Hash,
    timestamp: u64,
    nonce: u64,
) -> [u8; HEADER_BYTES] {
    let mut bytes = [0u8; HEADER_BYTES];
    bytes[0..8].copy_from_slice(&index.to_le_bytes());
    bytes[8..40].copy_from_slice(previous_hash);
    bytes[40..72].copy_from_slice(payload_root);
    bytes[72..80].copy_from_slice(&timestamp.to_le_bytes());
    bytes[NONCE_OFFSET..].copy_from_slice(&nonce.to_le_bytes());
    bytes
}

/// Merkle root over the entries' canonical encodings; the last node of an odd
/// level is paired with itself. An empty payload has the zero root.
pub fn payload_root(entries: &[Entry]) -> Hash {
    if entries.is_empty() {
        return ZERO_HASH;
    }
    let mut level: Vec<Hash> = entries
        .iter()
        .map(|entry| sha256(&entry.canonical_bytes()))
        .collect();

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let (a, b) = if pair.len() == 2 {
                (pair[0], pair[1])
            } else {
                (pair[0], pair[0])
            };
            let mut hasher = Sha256::new();
            hasher.update(a);
            hasher.update(b);
            next.push(hasher.finalize().into());
        }
        level = next;
    }
    level[0]
}

/// A block template awaiting its nonce. The payload root is computed once so
/// each mining attempt only rehashes the fixed-size header.
#[derive(Clone, Debug)]
pub struct Candidate {
    index: u64,
    timestamp: u64,
    previous_hash: Hash,
    payload: Vec<Entry>,
    header: [u8; HEADER_BYTES],
}

impl Candidate {
    pub fn new(index: u64, previous_hash: Hash, timestamp: u64, payload: Vec<Entry>) -> Self {
        let root = payload_root(&payload);
        let header = header_bytes(index, &previous_hash, &root, timestamp, 0);
        Self {
            index,
            timestamp,
            previous_hash,
            payload,
            header,
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn previous_hash(&self) -> &Hash {
        &self.previous_hash
    }

    pub fn payload(&self) -> &[Entry] {
        &self.payload
    }

    pub fn hash_with_nonce(&self, nonce: u64) -> Hash {
        let mut header = self.header;
        header[NONCE_OFFSET..].copy_from_slice(&nonce.to_le_bytes());
        sha256(&header)
    }

    pub fn seal(self, nonce: u64) -> Block {
        let hash = self.hash_with_nonce(nonce);
        Block {
            index: self.index,
            timestamp: self.timestamp,
            payload: self.payload,
            previous_hash: self.previous_hash,
            nonce,
            hash,
        }
    }
}
