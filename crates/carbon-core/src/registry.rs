use crate::{
    constants::DEFAULT_TOKENS_PER_TON,
    payload::{AccountId, ProjectId, ProjectRecord, TokenOperation},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("project {0} is already registered")]
    DuplicateProject(ProjectId),
    #[error("project {0} not found")]
    NotFound(ProjectId),
    #[error("project {project_id} rejected: {reason}")]
    InvalidRecord {
        project_id: ProjectId,
        reason: &'static str,
    },
    #[error("project {project_id} was already superseded by {by}")]
    AlreadySuperseded { project_id: ProjectId, by: ProjectId },
    #[error("issuance for project {0} overflows")]
    IssuanceOverflow(ProjectId),
    #[error("issue for project {project_id} does not match its entitlement")]
    IssuanceMismatch { project_id: ProjectId },
}

/// Reward rate applied to verified sequestration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuancePolicy {
    pub tokens_per_ton: u64,
}

impl Default for IssuancePolicy {
    fn default() -> Self {
        Self {
            tokens_per_ton: DEFAULT_TOKENS_PER_TON,
        }
    }
}

impl IssuancePolicy {
    pub fn new(tokens_per_ton: u64) -> Self {
        Self { tokens_per_ton }
    }

    pub fn tokens_for(&self, tons: u64) -> Option<u64> {
        tons.checked_mul(self.tokens_per_ton)
    }
}

/// Catalog of registered projects, plus the issuance each registration earned
/// and has not yet been paid on chain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProjectRegistry {
    policy: IssuancePolicy,
    projects: BTreeMap<ProjectId, ProjectRecord>,
    superseded_by: BTreeMap<ProjectId, ProjectId>,
    unclaimed: BTreeMap<ProjectId, TokenOperation>,
}

impl ProjectRegistry {
    pub fn new(policy: IssuancePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> IssuancePolicy {
        self.policy
    }

    /// Checks `record` against the catalog and computes the `Issue` it earns,
    /// without storing anything.
    pub fn prepare(&self, record: &ProjectRecord) -> Result<TokenOperation, RegistryError> {
        let id = &record.project_id;
        if id.trim().is_empty() {
            return Err(RegistryError::InvalidRecord {
                project_id: id.clone(),
                reason: "project id is empty",
            });
        }
        if record.owner_account.trim().is_empty() {
            return Err(RegistryError::InvalidRecord {
                project_id: id.clone(),
                reason: "owner account is empty",
            });
        }
        if self.projects.contains_key(id) {
            return Err(RegistryError::DuplicateProject(id.clone()));
        }

        let rewarded_tons = match &record.supersedes {
            None => record.co2_absorbed_tons,
            Some(old_id) if old_id == id => {
                return Err(RegistryError::InvalidRecord {
                    project_id: id.clone(),
                    reason: "a project cannot supersede itself",
                })
            }
            Some(old_id) => {
                let old = self.get(old_id)?;
                if let Some(by) = self.superseded_by.get(old_id) {
                    return Err(RegistryError::AlreadySuperseded {
                        project_id: old_id.clone(),
                        by: by.clone(),
                    });
                }
                // Only the increase over the superseded figure is rewarded.
                record.co2_absorbed_tons.saturating_sub(old.co2_absorbed_tons)
            }
        };

        let amount = self
            .policy
            .tokens_for(rewarded_tons)
            .ok_or_else(|| RegistryError::IssuanceOverflow(id.clone()))?;
        Ok(TokenOperation::issue(record.owner_account.clone(), amount, id.clone()))
    }

    /// Stores `record` and returns its pending `Issue`. The registry never
    /// touches balances; the issue has to be carried in a block.
    pub fn register(&mut self, record: ProjectRecord) -> Result<TokenOperation, RegistryError> {
        let issue = self.prepare(&record)?;
        let id = record.project_id.clone();
        if let Some(old_id) = &record.supersedes {
            self.superseded_by.insert(old_id.clone(), id.clone());
        }
        self.unclaimed.insert(id.clone(), issue.clone());
        self.projects.insert(id, record);
        Ok(issue)
    }

    /// Consumes the entitlement of `project_id`; the issue must pay exactly the
    /// computed amount to the project owner, once.
    pub(crate) fn claim_issue(
        &mut self,
        project_id: &str,
        to_account: &AccountId,
        amount: u64,
    ) -> Result<(), RegistryError> {
        self.get(project_id)?;
        match self.unclaimed.get(project_id) {
            Some(TokenOperation::Issue {
                to_account: owed_to,
                amount: owed,
                ..
            }) if owed_to == to_account && *owed == amount => {
                self.unclaimed.remove(project_id);
                Ok(())
            }
            _ => Err(RegistryError::IssuanceMismatch {
                project_id: project_id.to_string(),
            }),
        }
    }

    pub fn get(&self, project_id: &str) -> Result<&ProjectRecord, RegistryError> {
        self.projects
            .get(project_id)
            .ok_or_else(|| RegistryError::NotFound(project_id.to_string()))
    }

    pub fn contains(&self, project_id: &str) -> bool {
        self.projects.contains_key(project_id)
    }

    pub fn superseded_by(&self, project_id: &str) -> Option<&str> {
        self.superseded_by.get(project_id).map(String::as_str)
    }

    /// Issue still owed for a registered project, if not yet on chain.
    pub fn pending_issue(&self, project_id: &str) -> Option<&TokenOperation> {
        self.unclaimed.get(project_id)
    }

    /// Every record ever registered, ordered by project id.
    pub fn list(&self) -> impl Iterator<Item = &ProjectRecord> + '_ {
        self.projects.values()
    }

    /// Records that no later record supersedes.
    pub fn active(&self) -> impl Iterator<Item = &ProjectRecord> + '_ {
        self.projects
            .values()
            .filter(|record| !self.superseded_by.contains_key(&record.project_id))
    }

    pub fn total_co2_tons(&self) -> u64 {
        self.active()
            .fold(0u64, |acc, record| acc.saturating_add(record.co2_absorbed_tons))
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}
