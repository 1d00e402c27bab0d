use crate::{
    block::{Block, Candidate},
    config::ChainConfig,
    error::{ChainError, Violation},
    ledger::TokenLedger,
    mine::mine,
    payload::Entry,
    pow::{leading_zero_hex_digits, meets_difficulty, MiningControl},
    registry::ProjectRegistry,
    state::ChainState,
    unix_millis, Hash,
};
use tracing::{debug, info, warn};

/// Trait the storage backends should implement for the chain to be persisted.
/// This lives in `carbon-core` to avoid a circular dependency.
pub trait ChainStore: Send + Sync {
    fn put_block(&self, block: &Block) -> anyhow::Result<()>;
    fn get_block(&self, index: u64) -> anyhow::Result<Option<Block>>;
    fn tip_height(&self) -> anyhow::Result<u64>;
    fn tip_hash(&self) -> anyhow::Result<Option<Hash>>;
    fn close(&self) -> anyhow::Result<()>;

    /// Every stored block in index order; empty for a fresh store.
    fn load_blocks(&self) -> anyhow::Result<Vec<Block>> {
        if self.tip_hash()?.is_none() {
            return Ok(Vec::new());
        }
        let height = self.tip_height()?;
        let mut blocks = Vec::with_capacity(height as usize + 1);
        for index in 0..=height {
            match self.get_block(index)? {
                Some(block) => blocks.push(block),
                None => anyhow::bail!("block {index} missing below tip {height}"),
            }
        }
        Ok(blocks)
    }
}

/// The authoritative block sequence and the state derived from it.
///
/// Blocks only enter through [`Chain::commit`] (or [`Chain::append`], which
/// mines and commits) and are never changed afterwards.
#[derive(Clone, Debug)]
pub struct Chain {
    config: ChainConfig,
    blocks: Vec<Block>,
    state: ChainState,
    next_difficulty: u32,
}

impl Chain {
    /// A chain holding only the configured genesis block.
    pub fn new(config: ChainConfig) -> Self {
        let genesis = Block::genesis(config.genesis_timestamp);
        info!(hash = %genesis.hash_hex(), "created genesis block");
        Self {
            state: ChainState::new(config.issuance),
            next_difficulty: config.difficulty.initial(),
            blocks: vec![genesis],
            config,
        }
    }

    /// Rebuilds a chain from stored blocks. The sequence must pass the full
    /// audit and replay cleanly before it is handed out.
    pub fn from_blocks(blocks: Vec<Block>, config: ChainConfig) -> Result<Self, ChainError> {
        let next_difficulty = verify_blocks(&blocks, &config)?;
        let mut chain = Self {
            state: ChainState::new(config.issuance),
            next_difficulty,
            blocks,
            config,
        };
        chain.replay()?;
        info!(blocks = chain.len(), "loaded chain");
        Ok(chain)
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false: a chain holds at least its genesis block.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn height(&self) -> u64 {
        self.tip().index
    }

    pub fn tip(&self) -> &Block {
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, index: u64) -> Option<&Block> {
        usize::try_from(index).ok().and_then(|i| self.blocks.get(i))
    }

    pub fn registry(&self) -> &ProjectRegistry {
        &self.state.registry
    }

    pub fn ledger(&self) -> &TokenLedger {
        &self.state.ledger
    }

    /// Leading zero hex digits the next block must have.
    pub fn difficulty_for_next(&self) -> u32 {
        self.next_difficulty
    }

    /// Template for the block after the current tip. The timestamp never runs
    /// behind the tip's.
    pub fn candidate(&self, payload: Vec<Entry>, now_millis: u64) -> Candidate {
        let tip = self.tip();
        let timestamp = now_millis.max(tip.timestamp);
        debug!(index = tip.index + 1, entries = payload.len(), "built candidate");
        Candidate::new(tip.index + 1, tip.hash, timestamp, payload)
    }

    /// Dry-runs `payload` against the current state.
    pub fn check_payload(&self, payload: &[Entry]) -> Result<(), ChainError> {
        let mut scratch = self.state.clone();
        scratch.apply_payload(payload).map_err(|(_, err)| err)
    }

    /// Builds, mines and commits the next block.
    pub fn append(
        &mut self,
        payload: Vec<Entry>,
        control: &MiningControl,
    ) -> Result<&Block, ChainError> {
        self.check_payload(&payload)?;
        let candidate = self.candidate(payload, unix_millis());
        let block = mine(candidate, self.next_difficulty, control)?;
        self.commit(block)
    }

    /// Appends a mined block after checking it against the current tip and
    /// applying its payload to a scratch copy of the derived state.
    pub fn commit(&mut self, block: Block) -> Result<&Block, ChainError> {
        let next_state = self.verify_next(&block)?;
        Ok(self.push(block, next_state))
    }

    pub(crate) fn verify_next(&self, block: &Block) -> Result<ChainState, ChainError> {
        let tip = self.tip();
        if block.previous_hash != tip.hash {
            return Err(ChainError::Linkage {
                expected: tip.hash,
                found: block.previous_hash,
            });
        }
        let position = self.blocks.len() as u64;
        check_successor(position, tip, block, self.next_difficulty)
            .map_err(|violation| ChainError::invalid(position, violation))?;

        let mut next = self.state.clone();
        next.apply_payload(&block.payload).map_err(|(_, err)| err)?;
        Ok(next)
    }

    #[cfg(test)]
    pub(crate) fn blocks_mut_for_test(&mut self) -> &mut Vec<Block> {
        &mut self.blocks
    }

    pub(crate) fn push(&mut self, block: Block, state: ChainState) -> &Block {
        self.blocks.push(block);
        self.state = state;
        self.next_difficulty = self
            .config
            .difficulty
            .next(&self.blocks, self.next_difficulty);
        let tip = self.tip();
        info!(
            index = tip.index,
            hash = %tip.hash_hex(),
            entries = tip.payload.len(),
            "committed block"
        );
        tip
    }

    /// Audits every block from genesis and reports the first violation.
    pub fn validate_full(&self) -> Result<(), ChainError> {
        verify_blocks(&self.blocks, &self.config)
            .map(|_| ())
            .inspect_err(|err| warn!(%err, "chain audit failed"))
    }

    /// Rebuilds registry and ledger from genesis. The result only depends on
    /// the blocks, so replaying twice yields the same state.
    pub fn replay(&mut self) -> Result<(), ChainError> {
        let mut state = ChainState::new(self.config.issuance);
        for block in &self.blocks {
            state.apply_block(block)?;
        }
        self.state = state;
        debug!(blocks = self.blocks.len(), "replayed chain");
        Ok(())
    }
}

/// Audits `blocks` under `config` and returns the difficulty required of the
/// block that would follow them.
pub fn verify_blocks(blocks: &[Block], config: &ChainConfig) -> Result<u32, ChainError> {
    let genesis = blocks
        .first()
        .ok_or_else(|| ChainError::invalid(0, Violation::EmptyChain))?;
    if *genesis != Block::genesis(config.genesis_timestamp) {
        return Err(ChainError::invalid(0, Violation::MalformedGenesis));
    }

    let rule = &config.difficulty;
    let mut required = rule.initial();
    for position in 1..blocks.len() {
        check_successor(
            position as u64,
            &blocks[position - 1],
            &blocks[position],
            required,
        )
        .map_err(|violation| ChainError::invalid(position as u64, violation))?;
        required = rule.next(&blocks[..=position], required);
    }
    Ok(required)
}

fn check_successor(
    position: u64,
    previous: &Block,
    block: &Block,
    required: u32,
) -> Result<(), Violation> {
    if !block.is_internally_consistent() {
        return Err(Violation::HashMismatch);
    }
    if block.index != position {
        return Err(Violation::IndexMismatch {
            expected: position,
            found: block.index,
        });
    }
    if block.previous_hash != previous.hash {
        return Err(Violation::BrokenLinkage);
    }
    if block.timestamp < previous.timestamp {
        return Err(Violation::TimestampRegression {
            previous: previous.timestamp,
            found: block.timestamp,
        });
    }
    if !meets_difficulty(&block.hash, required) {
        return Err(Violation::InsufficientWork {
            required,
            found: leading_zero_hex_digits(&block.hash),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        difficulty::DifficultyRule,
        ledger::LedgerError,
        payload::{Category, ProjectRecord, TokenOperation},
        registry::RegistryError,
    };

    fn config() -> ChainConfig {
        ChainConfig::default()
            .with_fixed_difficulty(2)
            .with_tokens_per_ton(5)
    }

    fn register(chain: &mut Chain, id: &str, tons: u64, owner: &str) {
        let record = ProjectRecord::new(id, format!("Project {id}"), Category::Seagrass, tons, owner);
        let issue = chain.registry().prepare(&record).unwrap();
        chain
            .append(vec![record.into(), issue.into()], &MiningControl::new())
            .unwrap();
    }

    fn populated() -> Chain {
        let mut chain = Chain::new(config());
        register(&mut chain, "P1", 10, "owner");
        register(&mut chain, "P2", 4, "other");
        chain
            .append(
                vec![TokenOperation::transfer("owner", "other", 12).into()],
                &MiningControl::new(),
            )
            .unwrap();
        chain
    }

    #[test]
    fn new_chain_holds_valid_genesis() {
        let chain = Chain::new(config());
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.height(), 0);
        assert!(!chain.is_empty());
        assert!(chain.validate_full().is_ok());
        assert_eq!(chain.ledger().total_supply(), 0);
    }

    #[test]
    fn p1_registration_issues_fifty() {
        let mut chain = Chain::new(config());
        let record = ProjectRecord::new("P1", "Mangrove", Category::Mangrove, 10, "owner");
        let issue = chain.registry().prepare(&record).unwrap();
        assert_eq!(issue, TokenOperation::issue("owner", 50, "P1"));

        let block = chain
            .append(vec![record.into(), issue.into()], &MiningControl::new())
            .unwrap()
            .clone();
        assert_eq!(block.index, 1);
        assert!(meets_difficulty(&block.hash, 2));
        assert_eq!(chain.ledger().balance_of("owner"), 50);
        assert_eq!(chain.ledger().total_supply(), 50);
        assert!(chain.validate_full().is_ok());
    }

    #[test]
    fn overdraft_is_rejected_without_appending() {
        let mut chain = Chain::new(config());
        register(&mut chain, "P1", 10, "owner");
        let err = chain
            .append(
                vec![TokenOperation::transfer("owner", "other", 80).into()],
                &MiningControl::new(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ChainError::Ledger(LedgerError::InsufficientBalance {
                balance: 50,
                requested: 80,
                ..
            })
        ));
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.ledger().balance_of("owner"), 50);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut chain = Chain::new(config());
        register(&mut chain, "P1", 10, "owner");
        let record = ProjectRecord::new("P1", "again", Category::Coral, 1, "owner");
        let err = chain
            .append(vec![record.into()], &MiningControl::new())
            .unwrap_err();
        assert!(matches!(
            err,
            ChainError::Registry(RegistryError::DuplicateProject(_))
        ));
    }

    #[test]
    fn appended_blocks_link_and_meet_difficulty() {
        let chain = populated();
        for (i, block) in chain.blocks().iter().enumerate().skip(1) {
            assert_eq!(block.index, i as u64);
            assert_eq!(block.previous_hash, chain.blocks()[i - 1].hash);
            assert_eq!(block.compute_hash(), block.hash);
            assert!(meets_difficulty(&block.hash, 2));
            assert!(block.timestamp >= chain.blocks()[i - 1].timestamp);
        }
        assert!(chain.validate_full().is_ok());
    }

    #[test]
    fn tampered_payload_is_reported_at_its_index() {
        for target in 1..4 {
            let mut chain = populated();
            match &mut chain.blocks[target].payload[0] {
                Entry::Project(record) => record.co2_absorbed_tons += 1,
                Entry::Token(TokenOperation::Transfer { amount, .. }) => *amount += 1,
                Entry::Token(TokenOperation::Issue { amount, .. }) => *amount += 1,
            }
            match chain.validate_full() {
                Err(ChainError::InvalidBlock { index, violation }) => {
                    assert_eq!(index, target as u64);
                    assert_eq!(violation, Violation::HashMismatch);
                }
                other => panic!("expected violation at {target}, got {other:?}"),
            }
        }
    }

    #[test]
    fn tampering_any_header_field_is_detected() {
        let tamperings: [fn(&mut Block); 5] = [
            |b: &mut Block| b.index += 1,
            |b: &mut Block| b.timestamp += 1,
            |b: &mut Block| b.nonce += 1,
            |b: &mut Block| b.previous_hash[0] ^= 0x01,
            |b: &mut Block| b.hash[31] ^= 0x01,
        ];
        for tamper in tamperings {
            let mut chain = populated();
            tamper(&mut chain.blocks[2]);
            match chain.validate_full() {
                Err(ChainError::InvalidBlock { index, .. }) => assert_eq!(index, 2),
                other => panic!("tampering went unnoticed: {other:?}"),
            }
        }
    }

    #[test]
    fn remined_block_breaks_the_next_link() {
        let mut chain = populated();
        let original = chain.blocks[1].clone();
        let mut payload = original.payload.clone();
        if let Entry::Project(record) = &mut payload[0] {
            record.name = "forged".into();
        }
        let forged = mine(
            Candidate::new(1, original.previous_hash, original.timestamp, payload),
            2,
            &MiningControl::new(),
        )
        .unwrap();
        chain.blocks[1] = forged;
        match chain.validate_full() {
            Err(ChainError::InvalidBlock { index, violation }) => {
                assert_eq!(index, 2);
                assert_eq!(violation, Violation::BrokenLinkage);
            }
            other => panic!("forgery went unnoticed: {other:?}"),
        }
    }

    #[test]
    fn altered_genesis_is_malformed() {
        let mut chain = populated();
        chain.blocks[0].timestamp = 99;
        assert!(matches!(
            chain.validate_full(),
            Err(ChainError::InvalidBlock {
                index: 0,
                violation: Violation::MalformedGenesis
            })
        ));
    }

    #[test]
    fn replay_is_idempotent() {
        let mut chain = populated();
        let before = chain.state.clone();
        chain.replay().unwrap();
        let once = chain.state.clone();
        chain.replay().unwrap();
        assert_eq!(once, before);
        assert_eq!(chain.state, once);
        assert_eq!(chain.ledger().balance_of("owner"), 38);
        assert_eq!(chain.ledger().balance_of("other"), 32);
        assert_eq!(chain.ledger().total_supply(), 70);
    }

    #[test]
    fn stale_block_is_a_linkage_error() {
        let mut chain = Chain::new(config());
        let stale = chain.candidate(Vec::new(), 1);
        register(&mut chain, "P1", 10, "owner");
        let block = mine(stale, 2, &MiningControl::new()).unwrap();
        let err = chain.commit(block).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn unmined_block_is_rejected() {
        let mut chain = Chain::new(config());
        let candidate = chain.candidate(Vec::new(), 1);
        let nonce = (0u64..)
            .find(|n| !meets_difficulty(&candidate.hash_with_nonce(*n), 2))
            .unwrap();
        let err = chain.commit(candidate.seal(nonce)).unwrap_err();
        assert!(matches!(
            err,
            ChainError::InvalidBlock {
                index: 1,
                violation: Violation::InsufficientWork { required: 2, .. }
            }
        ));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn timestamp_regression_is_rejected() {
        let mut chain = Chain::new(config().with_genesis_timestamp(1_000));
        let candidate = Candidate::new(1, chain.tip().hash, 500, Vec::new());
        let block = mine(candidate, 2, &MiningControl::new()).unwrap();
        assert!(matches!(
            chain.commit(block),
            Err(ChainError::InvalidBlock {
                violation: Violation::TimestampRegression { .. },
                ..
            })
        ));
    }

    #[test]
    fn candidate_timestamp_never_precedes_tip() {
        let chain = Chain::new(config().with_genesis_timestamp(5_000));
        assert_eq!(chain.candidate(Vec::new(), 10).timestamp(), 5_000);
        assert_eq!(chain.candidate(Vec::new(), 6_000).timestamp(), 6_000);
    }

    #[test]
    fn from_blocks_rebuilds_state() {
        let chain = populated();
        let loaded = Chain::from_blocks(chain.blocks().to_vec(), config()).unwrap();
        assert_eq!(loaded.len(), chain.len());
        assert_eq!(loaded.ledger(), chain.ledger());
        assert_eq!(loaded.registry(), chain.registry());
        assert_eq!(loaded.difficulty_for_next(), chain.difficulty_for_next());
    }

    #[test]
    fn from_blocks_rejects_empty_and_tampered_input() {
        assert!(matches!(
            Chain::from_blocks(Vec::new(), config()),
            Err(ChainError::InvalidBlock {
                violation: Violation::EmptyChain,
                ..
            })
        ));
        let mut blocks = populated().blocks().to_vec();
        blocks[3].nonce += 1;
        assert!(matches!(
            Chain::from_blocks(blocks, config()),
            Err(ChainError::InvalidBlock { index: 3, .. })
        ));
    }

    #[test]
    fn from_blocks_rejects_payload_that_does_not_replay() {
        let mut blocks = vec![Block::genesis(0)];
        let overdraft = vec![TokenOperation::transfer("nobody", "x", 1).into()];
        let block = mine(
            Candidate::new(1, blocks[0].hash, 1, overdraft),
            2,
            &MiningControl::new(),
        )
        .unwrap();
        blocks.push(block);
        match Chain::from_blocks(blocks, config()) {
            Err(ChainError::InvalidBlock {
                index: 1,
                violation: Violation::PayloadRejected { entry, .. },
            }) => assert_eq!(entry, 0),
            other => panic!("expected payload rejection, got {other:?}"),
        }
    }

    #[test]
    fn from_blocks_requires_matching_difficulty() {
        let blocks = populated().blocks().to_vec();
        let stricter = config().with_fixed_difficulty(6);
        assert!(matches!(
            Chain::from_blocks(blocks, stricter),
            Err(ChainError::InvalidBlock {
                index: 1,
                violation: Violation::InsufficientWork { required: 6, .. }
            })
        ));
    }

    #[test]
    fn retargeting_chain_validates() {
        let rule = DifficultyRule::Retarget {
            initial: 1,
            min: 1,
            max: 2,
            window: 2,
            target_block_millis: 60_000,
        };
        let mut chain = Chain::new(config().with_difficulty(rule));
        for i in 0..5 {
            register(&mut chain, &format!("P{i}"), 1, "owner");
        }
        // Blocks arrive far faster than the target, so the rule climbs to its max.
        assert_eq!(chain.difficulty_for_next(), 2);
        assert!(chain.validate_full().is_ok());
        let reloaded = Chain::from_blocks(chain.blocks().to_vec(), chain.config().clone()).unwrap();
        assert_eq!(reloaded.difficulty_for_next(), 2);
    }

    #[test]
    fn block_lookup_by_index() {
        let chain = populated();
        assert_eq!(chain.block(2).map(|b| b.index), Some(2));
        assert!(chain.block(99).is_none());
    }
}
