pub const BYTE: usize = 8;
pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
pub const BITS_PER_HEX_DIGIT: u32 = 4;
/// index + previous_hash + payload_root + timestamp + nonce
pub const HEADER_BYTES: usize = BYTE + HASH_SIZE + HASH_SIZE + BYTE + BYTE;
pub const NONCE_OFFSET: usize = HEADER_BYTES - BYTE;

/// Leading zero hex digits required of each mined block.
pub const DEFAULT_DIFFICULTY: u32 = 2;
pub const MAX_DIFFICULTY: u32 = HASH_HEX_SIZE as u32;
pub const DEFAULT_RETARGET_WINDOW: u64 = 10;
pub const DEFAULT_TARGET_BLOCK_MILLIS: u64 = 2_000;

pub const TOKEN_NAME: &str = "BlueCarbonToken";
pub const TOKEN_SYMBOL: &str = "BCT";
pub const DEFAULT_TOKENS_PER_TON: u64 = 1;

pub const GENESIS_TIMESTAMP: u64 = 0;
/// Nonces hashed per parallel window between cancellation checks.
pub const NONCE_WINDOW: u64 = 1 << 16;
pub const DEFAULT_APPEND_ATTEMPTS: u32 = 8;
pub const SNAPSHOT_VERSION: u32 = 1;
