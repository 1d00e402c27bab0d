use anyhow::{Context, Result};
use carbon_core::{Block, ChainStore, Hash};
use sled::{Db, IVec, Tree};
use std::path::Path;
use tracing::{debug, info};

const TREE_BLOCKS: &str = "blocks";
/// Tip height (big-endian) followed by the tip hash, kept under one key so
/// both change together.
const KEY_TIP: &[u8] = b"tip";
const TIP_BYTES: usize = 8 + 32;

#[derive(Clone)]
pub struct SledStore {
  db: Db,
  blocks: Tree,
}

impl SledStore {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let db = sled::open(path)
      .with_context(|| format!("opening sled store at {}", path.display()))?;
    let store = Self::from_db(db)?;
    info!(path = %path.display(), "sled store opened");
    Ok(store)
  }

  /// In-memory store removed when dropped.
  pub fn temporary() -> Result<Self> {
    let db = sled::Config::new()
      .temporary(true)
      .open()
      .context("opening temporary sled store")?;
    Self::from_db(db)
  }

  fn from_db(db: Db) -> Result<Self> {
    let blocks = db.open_tree(TREE_BLOCKS).context("opening blocks tree")?;
    Ok(Self { db, blocks })
  }

  pub fn len(&self) -> usize {
    self.blocks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.blocks.is_empty()
  }

  /// Drops every block and the tip markers.
  pub fn clear(&self) -> Result<()> {
    self.blocks.clear()?;
    self.db.remove(KEY_TIP)?;
    self.db.flush()?;
    Ok(())
  }

  fn tip(&self) -> Result<Option<(u64, Hash)>> {
    self
      .db
      .get(KEY_TIP)?
      .map(|v| decode_tip(&v))
      .transpose()
  }
}

fn decode_block(bytes: &IVec) -> Result<Block> {
  bincode::deserialize(bytes).context("decoding stored block")
}

fn encode_tip(block: &Block) -> Vec<u8> {
  let mut bytes = Vec::with_capacity(TIP_BYTES);
  bytes.extend_from_slice(&block.index.to_be_bytes());
  bytes.extend_from_slice(&block.hash);
  bytes
}

fn decode_tip(bytes: &[u8]) -> Result<(u64, Hash)> {
  anyhow::ensure!(bytes.len() == TIP_BYTES, "malformed tip record");
  let (height, hash) = bytes.split_at(8);
  let height: [u8; 8] = height.try_into().context("malformed tip height")?;
  let hash: Hash = hash.try_into().context("malformed tip hash")?;
  Ok((u64::from_be_bytes(height), hash))
}

impl ChainStore for SledStore {
  fn put_block(&self, block: &Block) -> Result<()> {
    let bytes = bincode::serialize(block).context("encoding block")?;
    self.blocks.insert(block.index.to_be_bytes(), bytes)?;

    // the tip only moves forward; rewriting older blocks leaves it alone
    let tip = encode_tip(block);
    self.db.fetch_and_update(KEY_TIP, |current| match current {
      Some(old) if matches!(decode_tip(old), Ok((height, _)) if height > block.index) => {
        Some(old.to_vec())
      }
      _ => Some(tip.clone()),
    })?;

    self.db.flush()?;
    debug!(index = block.index, "stored block");
    Ok(())
  }

  fn get_block(&self, index: u64) -> Result<Option<Block>> {
    self.blocks
      .get(index.to_be_bytes())?
      .map(|ivec| decode_block(&ivec))
      .transpose()
      .with_context(|| format!("reading block {index}"))
  }

  fn tip_height(&self) -> Result<u64> {
    Ok(self.tip()?.map_or(0, |(height, _)| height))
  }

  fn tip_hash(&self) -> Result<Option<Hash>> {
    Ok(self.tip()?.map(|(_, hash)| hash))
  }

  fn close(&self) -> Result<()> {
    self.db.flush()?;
    Ok(())
  }

  /// Scans the block tree in key order, which is index order.
  fn load_blocks(&self) -> Result<Vec<Block>> {
    self.blocks
      .iter()
      .values()
      .map(|value| decode_block(&value?))
      .collect()
  }
}
