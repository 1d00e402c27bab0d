use crate::payload::{AccountId, TokenOperation};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient balance: {account} holds {balance} BCT, {requested} requested")]
    InsufficientBalance {
        account: AccountId,
        balance: u64,
        requested: u64,
    },
    #[error("issuing {amount} BCT would overflow the total supply")]
    SupplyOverflow { amount: u64 },
}

/// BCT balances. Only chain replay mutates it, one `TokenOperation` at a time,
/// so `total_supply` always equals the sum of all balances.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TokenLedger {
    balances: BTreeMap<AccountId, u64>,
    total_supply: u64,
}

impl TokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every check runs before the first write, so a failed operation leaves
    /// the ledger untouched.
    pub(crate) fn apply(&mut self, op: &TokenOperation) -> Result<(), LedgerError> {
        match op {
            TokenOperation::Issue {
                to_account, amount, ..
            } => {
                let supply = self
                    .total_supply
                    .checked_add(*amount)
                    .ok_or(LedgerError::SupplyOverflow { amount: *amount })?;
                // A single balance never exceeds the supply, so this cannot overflow.
                *self.balances.entry(to_account.clone()).or_insert(0) += amount;
                self.total_supply = supply;
            }
            TokenOperation::Transfer {
                from_account,
                to_account,
                amount,
            } => {
                let balance = self.balance_of(from_account);
                if balance < *amount {
                    return Err(LedgerError::InsufficientBalance {
                        account: from_account.clone(),
                        balance,
                        requested: *amount,
                    });
                }
                if *amount > 0 && from_account != to_account {
                    self.balances.insert(from_account.clone(), balance - amount);
                    *self.balances.entry(to_account.clone()).or_insert(0) += amount;
                }
            }
        }
        Ok(())
    }

    /// Unknown accounts hold nothing.
    pub fn balance_of(&self, account: &str) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    /// Balances ordered by account id.
    pub fn balances(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.balances.iter().map(|(account, balance)| (account.as_str(), *balance))
    }

    pub fn accounts(&self) -> usize {
        self.balances.len()
    }
}
