use crate::{
    block::Block,
    constants::{DEFAULT_DIFFICULTY, MAX_DIFFICULTY},
};
use serde::{Deserialize, Serialize};

/// How much work each height requires. The rule is part of the chain's
/// configuration: an audit replays it over the stored blocks to recover the
/// difficulty each block was mined under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "rule")]
pub enum DifficultyRule {
    Fixed {
        difficulty: u32,
    },
    /// Every `window` blocks, raise the difficulty by one digit when the
    /// window was mined in under half of the target time, lower it by one
    /// when it took over twice the target.
    Retarget {
        initial: u32,
        min: u32,
        max: u32,
        window: u64,
        target_block_millis: u64,
    },
}

impl Default for DifficultyRule {
    fn default() -> Self {
        DifficultyRule::Fixed {
            difficulty: DEFAULT_DIFFICULTY,
        }
    }
}

impl DifficultyRule {
    pub fn fixed(difficulty: u32) -> Self {
        DifficultyRule::Fixed {
            difficulty: difficulty.min(MAX_DIFFICULTY),
        }
    }

    /// Difficulty of block 1.
    pub fn initial(&self) -> u32 {
        match *self {
            DifficultyRule::Fixed { difficulty } => difficulty,
            DifficultyRule::Retarget {
                initial, min, max, ..
            } => initial.clamp(min, max.max(min)),
        }
    }

    /// Difficulty of the block following `blocks`, given the difficulty that
    /// applied to the last of them.
    pub fn next(&self, blocks: &[Block], current: u32) -> u32 {
        match *self {
            DifficultyRule::Fixed { difficulty } => difficulty,
            DifficultyRule::Retarget {
                min,
                max,
                window,
                target_block_millis,
                ..
            } => {
                let max = max.max(min);
                let mined = blocks.len().saturating_sub(1) as u64;
                if window == 0 || mined == 0 || mined % window != 0 || mined < window {
                    return current;
                }
                let last = &blocks[blocks.len() - 1];
                let first = &blocks[blocks.len() - 1 - window as usize];
                let elapsed = last.timestamp.saturating_sub(first.timestamp);
                let target = target_block_millis.saturating_mul(window);
                if elapsed < target / 2 {
                    current.saturating_add(1).clamp(min, max)
                } else if elapsed > target.saturating_mul(2) {
                    current.saturating_sub(1).clamp(min, max)
                } else {
                    current.clamp(min, max)
                }
            }
        }
    }
}
