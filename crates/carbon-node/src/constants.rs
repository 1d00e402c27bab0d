pub(crate) const BLOCKS_PER_BATCH: usize = 25;
pub(crate) const MAX_BLOCKS_PER_REQUEST: usize = BLOCKS_PER_BATCH * 10;
pub(crate) const DEFAULT_MINE_TIMEOUT_SECS: u64 = 30;
