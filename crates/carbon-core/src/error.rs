use crate::{ledger::LedgerError, pow::MineError, registry::RegistryError, Hash};
use serde::Serialize;
use thiserror::Error;

/// Why a block failed verification.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Violation {
    #[error("chain has no blocks")]
    EmptyChain,
    #[error("genesis block does not match the configured genesis")]
    MalformedGenesis,
    #[error("stored hash does not match the block contents")]
    HashMismatch,
    #[error("expected index {expected}, found {found}")]
    IndexMismatch { expected: u64, found: u64 },
    #[error("previous hash does not match the preceding block")]
    BrokenLinkage,
    #[error("timestamp {found} precedes the previous block's {previous}")]
    TimestampRegression { previous: u64, found: u64 },
    #[error("hash has {found} leading zero digits, {required} required")]
    InsufficientWork { required: u32, found: u32 },
    #[error("payload entry {entry} rejected: {reason}")]
    PayloadRejected { entry: usize, reason: String },
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error(
        "tail moved: chain ends at {}, block extends {}",
        hex::encode(.expected),
        hex::encode(.found)
    )]
    Linkage { expected: Hash, found: Hash },
    #[error("invalid block at index {index}: {violation}")]
    InvalidBlock { index: u64, violation: Violation },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Mining(#[from] MineError),
    #[error("chain failed its last audit at index {index} ({violation}); ledger queries are refused")]
    Untrusted { index: u64, violation: Violation },
    #[error("gave up after {attempts} attempts lost to concurrent appends")]
    RetriesExhausted { attempts: u32 },
    #[error("unsupported snapshot version {0}")]
    SnapshotVersion(u32),
    #[error("snapshot i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("block store: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl ChainError {
    /// Only a lost race on the tail is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChainError::Linkage { .. })
    }

    pub fn invalid(index: u64, violation: Violation) -> Self {
        ChainError::InvalidBlock { index, violation }
    }
}
