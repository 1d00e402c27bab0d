use crate::{
    block::Block, chain::Chain, config::ChainConfig, constants::SNAPSHOT_VERSION,
    error::ChainError,
};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};
use tracing::info;

/// Full-chain export: every block in index order, each with the fields
/// `index, timestamp, payload, previous_hash, nonce, hash`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub blocks: Vec<Block>,
}

impl Snapshot {
    pub fn of(chain: &Chain) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            blocks: chain.blocks().to_vec(),
        }
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), ChainError> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: R) -> Result<Self, ChainError> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Writes to a sibling temp file and renames it over `path`, so readers
    /// never see a half-written snapshot.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ChainError> {
        let path = path.as_ref();
        let tmp = path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            self.write_to(&mut writer)?;
            writer.flush()?;
        }
        fs::rename(&tmp, path)?;
        info!(path = %path.display(), blocks = self.blocks.len(), "saved snapshot");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ChainError> {
        let file = File::open(path.as_ref())?;
        Self::read_from(BufReader::new(file))
    }

    /// The loaded blocks are not trusted until they pass the full audit and
    /// replay under `config`.
    pub fn into_chain(self, config: ChainConfig) -> Result<Chain, ChainError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(ChainError::SnapshotVersion(self.version));
        }
        Chain::from_blocks(self.blocks, config)
    }
}
