#![allow(dead_code)]

use carbon_core::{Block, Candidate, Category, ChainConfig, Hash, ProjectRecord, ZERO_HASH};
use carbon_storage::SledStore;
use tempfile::{tempdir, TempDir};

pub fn create_temp_store() -> (TempDir, SledStore) {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let store = SledStore::open(temp_dir.path()).expect("Failed to open SledStore");
    (temp_dir, store)
}

pub fn reopen(temp_dir: &TempDir) -> SledStore {
    SledStore::open(temp_dir.path()).expect("Failed to reopen SledStore")
}

pub fn teardown_store(temp_dir: TempDir, store: SledStore) {
    store.clear().expect("Failed to clear the store");
    drop(store);
    let db_path = temp_dir.path().to_path_buf();
    temp_dir.close().expect("Failed to delete temp dir");
    assert!(!db_path.exists(), "Database directory should be removed");
}

/// Linked but unmined blocks; the store does not check work.
pub fn linked_blocks(count: u64) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::new();
    let mut previous: Hash = ZERO_HASH;
    for index in 0..count {
        let block = Candidate::new(index, previous, 1_700_000_000_000 + index, Vec::new()).seal(index);
        previous = block.hash;
        blocks.push(block);
    }
    blocks
}

pub fn config() -> ChainConfig {
    ChainConfig::default().with_fixed_difficulty(1)
}

pub fn mangrove(id: &str, tons: u64, owner: &str) -> ProjectRecord {
    ProjectRecord::new(id, "Mangrove Restoration", Category::Mangrove, tons, owner)
        .with_location("Goa")
        .with_area_ha(5)
        .with_species("Rhizophora")
}
