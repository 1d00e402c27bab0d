use crate::{constants::GENESIS_TIMESTAMP, difficulty::DifficultyRule, registry::IssuancePolicy};
use serde::{Deserialize, Serialize};

/// Consensus parameters of one chain. Loading a snapshot requires the same
/// configuration it was mined under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default)]
    pub difficulty: DifficultyRule,
    #[serde(default)]
    pub issuance: IssuancePolicy,
    #[serde(default)]
    pub genesis_timestamp: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty: DifficultyRule::default(),
            issuance: IssuancePolicy::default(),
            genesis_timestamp: GENESIS_TIMESTAMP,
        }
    }
}

impl ChainConfig {
    pub fn with_difficulty(mut self, rule: DifficultyRule) -> Self {
        self.difficulty = rule;
        self
    }

    pub fn with_fixed_difficulty(self, difficulty: u32) -> Self {
        self.with_difficulty(DifficultyRule::fixed(difficulty))
    }

    pub fn with_tokens_per_ton(mut self, tokens_per_ton: u64) -> Self {
        self.issuance = IssuancePolicy::new(tokens_per_ton);
        self
    }

    pub fn with_genesis_timestamp(mut self, timestamp: u64) -> Self {
        self.genesis_timestamp = timestamp;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{DEFAULT_DIFFICULTY, DEFAULT_TOKENS_PER_TON};

    #[test]
    fn defaults_match_constants() {
        let config = ChainConfig::default();
        assert_eq!(config.difficulty.initial(), DEFAULT_DIFFICULTY);
        assert_eq!(config.issuance.tokens_per_ton, DEFAULT_TOKENS_PER_TON);
        assert_eq!(config.genesis_timestamp, GENESIS_TIMESTAMP);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: ChainConfig =
            serde_json::from_str(r#"{"issuance":{"tokens_per_ton":5}}"#).unwrap();
        assert_eq!(config.issuance.tokens_per_ton, 5);
        assert_eq!(config.difficulty, DifficultyRule::default());
    }
}
