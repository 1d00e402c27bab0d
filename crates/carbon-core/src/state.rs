use crate::{
    block::Block,
    error::{ChainError, Violation},
    ledger::TokenLedger,
    payload::{Entry, TokenOperation},
    registry::{IssuancePolicy, ProjectRegistry},
};

/// Registry and ledger as produced by replaying block payloads.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct ChainState {
    pub(crate) registry: ProjectRegistry,
    pub(crate) ledger: TokenLedger,
}

impl ChainState {
    pub(crate) fn new(policy: IssuancePolicy) -> Self {
        Self {
            registry: ProjectRegistry::new(policy),
            ledger: TokenLedger::new(),
        }
    }

    /// Applies entries in order. On error the state may hold a prefix of the
    /// payload, so callers apply to a scratch copy.
    pub(crate) fn apply_payload(&mut self, payload: &[Entry]) -> Result<(), (usize, ChainError)> {
        for (position, entry) in payload.iter().enumerate() {
            self.apply_entry(entry).map_err(|err| (position, err))?;
        }
        Ok(())
    }

    /// Replay form: failures become a violation at the block's index.
    pub(crate) fn apply_block(&mut self, block: &Block) -> Result<(), ChainError> {
        self.apply_payload(&block.payload).map_err(|(entry, err)| {
            ChainError::invalid(
                block.index,
                Violation::PayloadRejected {
                    entry,
                    reason: err.to_string(),
                },
            )
        })
    }

    fn apply_entry(&mut self, entry: &Entry) -> Result<(), ChainError> {
        match entry {
            Entry::Project(record) => {
                self.registry.register(record.clone())?;
            }
            Entry::Token(op) => {
                if let TokenOperation::Issue {
                    to_account,
                    amount,
                    reason,
                } = op
                {
                    self.registry.claim_issue(reason, to_account, *amount)?;
                }
                self.ledger.apply(op)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ledger::LedgerError,
        payload::{Category, ProjectRecord},
        registry::RegistryError,
    };

    fn registration() -> Vec<Entry> {
        vec![
            ProjectRecord::new("P1", "Mangrove", Category::Mangrove, 10, "owner").into(),
            TokenOperation::issue("owner", 50, "P1").into(),
        ]
    }

    #[test]
    fn registration_payload_credits_owner() {
        let mut state = ChainState::new(IssuancePolicy::new(5));
        state.apply_payload(&registration()).unwrap();
        assert_eq!(state.ledger.balance_of("owner"), 50);
        assert!(state.registry.contains("P1"));
    }

    #[test]
    fn issue_without_registration_is_rejected() {
        let mut state = ChainState::new(IssuancePolicy::new(5));
        let (position, err) = state
            .apply_payload(&[TokenOperation::issue("owner", 50, "P1").into()])
            .unwrap_err();
        assert_eq!(position, 0);
        assert!(matches!(
            err,
            ChainError::Registry(RegistryError::NotFound(_))
        ));
        assert_eq!(state.ledger.total_supply(), 0);
    }

    #[test]
    fn inflated_issue_is_rejected() {
        let mut state = ChainState::new(IssuancePolicy::new(5));
        let mut payload = registration();
        payload[1] = TokenOperation::issue("owner", 500, "P1").into();
        let (position, _) = state.apply_payload(&payload).unwrap_err();
        assert_eq!(position, 1);
    }

    #[test]
    fn overdraft_reports_entry_position() {
        let mut state = ChainState::new(IssuancePolicy::new(5));
        let mut payload = registration();
        payload.push(TokenOperation::transfer("owner", "other", 80).into());
        let (position, err) = state.apply_payload(&payload).unwrap_err();
        assert_eq!(position, 2);
        assert!(matches!(
            err,
            ChainError::Ledger(LedgerError::InsufficientBalance { .. })
        ));
    }
}
