//! Chain-and-ledger engine for the blue carbon registry.
//!
//! Project records and token operations are packed into proof-of-work blocks.
//! The project registry and the token ledger are derived state: they are only
//! ever produced by replaying block payloads in chain order.
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod block;
pub mod chain;
pub mod config;
pub mod constants;
pub mod difficulty;
pub mod error;
pub mod ledger;
pub mod mine;
pub mod payload;
pub mod pow;
pub mod registry;
pub mod shared;
pub mod snapshot;
mod state;

pub use block::{payload_root, Block, Candidate};
pub use chain::{Chain, ChainStore};
pub use config::ChainConfig;
pub use difficulty::DifficultyRule;
pub use error::{ChainError, Violation};
pub use ledger::{LedgerError, TokenLedger};
pub use mine::mine;
pub use payload::{AccountId, Category, Entry, ProjectId, ProjectRecord, TokenOperation};
pub use pow::{CancelToken, MineError, MiningControl};
pub use registry::{IssuancePolicy, ProjectRegistry, RegistryError};
pub use shared::{ChainStatus, PendingRegistration, SharedChain};
pub use snapshot::Snapshot;

pub type Hash = [u8; 32];

/// Previous-hash sentinel carried by the genesis block.
pub const ZERO_HASH: Hash = [0u8; 32];

pub fn sha256(bytes: &[u8]) -> Hash {
    Sha256::digest(bytes).into()
}

/// Milliseconds since the Unix epoch, clamped to 0 if the clock is before it.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Serde adapter writing hashes as lowercase hex.
pub mod hash_hex {
    use super::Hash;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &Hash, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(hash))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Hash, D::Error> {
        let text = String::deserialize(deserializer)?;
        let mut out = [0u8; 32];
        hex::decode_to_slice(&text, &mut out).map_err(D::Error::custom)?;
        Ok(out)
    }
}
