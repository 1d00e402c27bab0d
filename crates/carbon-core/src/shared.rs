use crate::{
    block::{Block, Candidate},
    chain::{Chain, ChainStore},
    config::ChainConfig,
    constants::DEFAULT_APPEND_ATTEMPTS,
    error::{ChainError, Violation},
    mine::mine,
    payload::{AccountId, Entry, ProjectRecord, TokenOperation},
    pow::MiningControl,
    snapshot::Snapshot,
    unix_millis,
};
use serde::Serialize;
use std::{
    path::Path,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use tracing::{info, warn};

/// Entries a registration contributes to the next block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingRegistration {
    pub record: ProjectRecord,
    pub issue: TokenOperation,
}

impl PendingRegistration {
    pub fn entries(&self) -> Vec<Entry> {
        vec![
            Entry::Project(self.record.clone()),
            Entry::Token(self.issue.clone()),
        ]
    }
}

/// Summary served to dashboards. The registry and ledger figures are withheld
/// while the chain is untrusted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChainStatus {
    pub height: u64,
    pub tip_hash: String,
    pub next_difficulty: u32,
    pub projects: Option<usize>,
    pub accounts: Option<usize>,
    pub total_supply: Option<u64>,
    pub trusted: bool,
}

#[derive(Debug)]
struct Inner {
    chain: Chain,
    /// First violation found by the last failed audit.
    audit_failure: Option<(u64, Violation)>,
}

/// The process-wide chain handle.
///
/// Readers share a read lock and see one consistent state. Mutations are
/// serialized by the write lock. Mining runs outside the lock: a block is
/// mined against the tip observed at preparation time and the commit rejects
/// it with [`ChainError::Linkage`] if another writer got there first.
#[derive(Clone)]
pub struct SharedChain {
    inner: Arc<RwLock<Inner>>,
    store: Option<Arc<dyn ChainStore>>,
}

impl SharedChain {
    pub fn new(config: ChainConfig) -> Self {
        Self::from_chain(Chain::new(config))
    }

    pub fn from_chain(chain: Chain) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                chain,
                audit_failure: None,
            })),
            store: None,
        }
    }

    /// Writes every future commit through to `store`, inside the commit's
    /// critical section and before the block becomes visible.
    pub fn with_store(mut self, store: Arc<dyn ChainStore>) -> Self {
        self.store = Some(store);
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` against a consistent view of the chain.
    pub fn view<R>(&self, f: impl FnOnce(&Chain) -> R) -> R {
        f(&self.read().chain)
    }

    /// Like [`SharedChain::view`], but refuses while the chain is untrusted.
    pub fn trusted_view<R>(&self, f: impl FnOnce(&Chain) -> R) -> Result<R, ChainError> {
        let inner = self.read();
        ensure_trusted(&inner)?;
        Ok(f(&inner.chain))
    }

    pub fn status(&self) -> ChainStatus {
        let inner = self.read();
        let chain = &inner.chain;
        let trusted = inner.audit_failure.is_none();
        ChainStatus {
            height: chain.height(),
            tip_hash: chain.tip().hash_hex(),
            next_difficulty: chain.difficulty_for_next(),
            projects: trusted.then_some(chain.registry().len()),
            accounts: trusted.then_some(chain.ledger().accounts()),
            total_supply: trusted.then_some(chain.ledger().total_supply()),
            trusted,
        }
    }

    pub fn balance_of(&self, account: &str) -> Result<u64, ChainError> {
        self.trusted_view(|chain| chain.ledger().balance_of(account))
    }

    pub fn total_supply(&self) -> Result<u64, ChainError> {
        self.trusted_view(|chain| chain.ledger().total_supply())
    }

    pub fn balances(&self) -> Result<Vec<(AccountId, u64)>, ChainError> {
        self.trusted_view(|chain| {
            chain
                .ledger()
                .balances()
                .map(|(account, balance)| (account.to_string(), balance))
                .collect()
        })
    }

    pub fn projects(&self) -> Result<Vec<ProjectRecord>, ChainError> {
        self.trusted_view(|chain| chain.registry().list().cloned().collect())
    }

    pub fn project(&self, project_id: &str) -> Result<ProjectRecord, ChainError> {
        self.trusted_view(|chain| chain.registry().get(project_id).cloned())?
            .map_err(ChainError::from)
    }

    /// Full audit. A failure marks the chain untrusted until a later audit
    /// passes or the chain is replaced. The verdict is recorded under the same
    /// guard the audit ran under, so it always belongs to the audited chain.
    pub fn validate_full(&self) -> Result<(), ChainError> {
        let mut inner = self.write();
        let result = inner.chain.validate_full();
        match &result {
            Ok(()) => inner.audit_failure = None,
            Err(ChainError::InvalidBlock { index, violation }) => {
                inner.audit_failure = Some((*index, violation.clone()));
            }
            Err(_) => {}
        }
        result
    }

    /// Checks `record` against the current registry and returns the entries
    /// to put in the next block. Nothing is stored until those entries commit.
    pub fn register(&self, record: ProjectRecord) -> Result<PendingRegistration, ChainError> {
        let issue = self.trusted_view(|chain| chain.registry().prepare(&record))??;
        Ok(PendingRegistration { record, issue })
    }

    /// Template and difficulty for the block after the current tip. The payload
    /// is dry-run first so a doomed block is never mined.
    pub fn prepare(&self, payload: Vec<Entry>) -> Result<(Candidate, u32), ChainError> {
        let inner = self.read();
        ensure_trusted(&inner)?;
        inner.chain.check_payload(&payload)?;
        let candidate = inner.chain.candidate(payload, unix_millis());
        Ok((candidate, inner.chain.difficulty_for_next()))
    }

    /// Commits a mined block, writing it through to the attached store first.
    pub fn commit(&self, block: Block) -> Result<Block, ChainError> {
        let mut inner = self.write();
        ensure_trusted(&inner)?;
        let next_state = inner.chain.verify_next(&block).inspect_err(|err| {
            if err.is_retryable() {
                warn!(%err, "lost race for the chain tip");
            }
        })?;
        if let Some(store) = &self.store {
            store.put_block(&block)?;
        }
        Ok(inner.chain.push(block, next_state).clone())
    }

    /// Prepares, mines (without holding any lock) and commits one block.
    pub fn submit(&self, payload: Vec<Entry>, control: &MiningControl) -> Result<Block, ChainError> {
        let (candidate, difficulty) = self.prepare(payload)?;
        let block = mine(candidate, difficulty, control)?;
        self.commit(block)
    }

    /// [`SharedChain::submit`], rebuilding the candidate on the new tip each
    /// time a concurrent append wins the race.
    pub fn submit_with_retry(
        &self,
        payload: Vec<Entry>,
        control: &MiningControl,
        max_attempts: u32,
    ) -> Result<Block, ChainError> {
        for attempt in 1..=max_attempts {
            match self.submit(payload.clone(), control) {
                Err(err) if err.is_retryable() => {
                    warn!(attempt, "retrying append against the new tip");
                }
                other => return other,
            }
        }
        Err(ChainError::RetriesExhausted {
            attempts: max_attempts,
        })
    }

    /// Registers a project and puts the record and its issuance on chain.
    pub fn register_and_submit(
        &self,
        record: ProjectRecord,
        control: &MiningControl,
    ) -> Result<(Block, TokenOperation), ChainError> {
        let pending = self.register(record)?;
        let block = self.submit_with_retry(pending.entries(), control, DEFAULT_APPEND_ATTEMPTS)?;
        Ok((block, pending.issue))
    }

    pub fn transfer(
        &self,
        from_account: impl Into<AccountId>,
        to_account: impl Into<AccountId>,
        amount: u64,
        control: &MiningControl,
    ) -> Result<Block, ChainError> {
        let op = TokenOperation::transfer(from_account, to_account, amount);
        self.submit_with_retry(vec![op.into()], control, DEFAULT_APPEND_ATTEMPTS)
    }

    pub fn replay(&self) -> Result<(), ChainError> {
        self.write().chain.replay()
    }

    /// Swaps in a different chain, clearing any failed audit.
    pub fn replace(&self, chain: Chain) {
        let mut inner = self.write();
        inner.chain = chain;
        inner.audit_failure = None;
    }

    /// Writes every block to `store` while holding the mutation lock.
    pub fn persist(&self, store: &dyn ChainStore) -> Result<usize, ChainError> {
        let inner = self.write();
        for block in inner.chain.blocks() {
            store.put_block(block)?;
        }
        Ok(inner.chain.len())
    }

    /// Loads the chain kept in `store`, or starts a new one there if the store
    /// is empty. Later commits are written through to the same store.
    pub fn restore(store: Arc<dyn ChainStore>, config: ChainConfig) -> Result<Self, ChainError> {
        let blocks = store.load_blocks()?;
        let chain = if blocks.is_empty() {
            let chain = Chain::new(config);
            store.put_block(chain.tip())?;
            info!("initialized empty block store with genesis");
            chain
        } else {
            Chain::from_blocks(blocks, config)?
        };
        Ok(Self::from_chain(chain).with_store(store))
    }

    /// Writes a JSON snapshot while holding the mutation lock.
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<usize, ChainError> {
        let inner = self.write();
        let snapshot = Snapshot::of(&inner.chain);
        snapshot.save(path)?;
        Ok(snapshot.blocks.len())
    }

    pub fn load_snapshot(path: impl AsRef<Path>, config: ChainConfig) -> Result<Self, ChainError> {
        let chain = Snapshot::load(path)?.into_chain(config)?;
        Ok(Self::from_chain(chain))
    }
}

fn ensure_trusted(inner: &Inner) -> Result<(), ChainError> {
    match &inner.audit_failure {
        Some((index, violation)) => Err(ChainError::Untrusted {
            index: *index,
            violation: violation.clone(),
        }),
        None => Ok(()),
    }
}
