use crate::{constants::BITS_PER_HEX_DIGIT, Hash};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MineError {
    #[error("mining cancelled")]
    Cancelled,
    #[error("mining deadline exceeded")]
    DeadlineExceeded,
    #[error("nonce space exhausted")]
    NonceSpaceExhausted,
}

pub fn count_leading_zero_bits(hash: &Hash) -> u32 {
    let mut total = 0u32;
    for b in hash {
        if *b == 0 {
            total += 8;
        } else {
            total += b.leading_zeros();
            break;
        }
    }
    total
}

pub fn leading_zero_hex_digits(hash: &Hash) -> u32 {
    count_leading_zero_bits(hash) / BITS_PER_HEX_DIGIT
}

/// True when the hash starts with at least `difficulty` zero hex digits.
pub fn meets_difficulty(hash: &Hash, difficulty: u32) -> bool {
    count_leading_zero_bits(hash) >= difficulty.saturating_mul(BITS_PER_HEX_DIGIT)
}

/// Shared flag a caller flips to abandon an in-flight search.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Cancellation and deadline for one mining attempt.
#[derive(Clone, Debug, Default)]
pub struct MiningControl {
    cancel: CancelToken,
    deadline: Option<Instant>,
}

impl MiningControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn check(&self) -> Result<(), MineError> {
        if self.cancel.is_cancelled() {
            return Err(MineError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(MineError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_zero_bits_examples() {
        let mut h = [0u8; 32];
        assert_eq!(count_leading_zero_bits(&h), 256);
        h[0] = 0x0F; // 00001111
        assert_eq!(count_leading_zero_bits(&h), 4);
        h = [0u8; 32];
        h[1] = 0x80; // 00000000 10000000
        assert_eq!(count_leading_zero_bits(&h), 8);
        h[1] = 0x40; // 01000000
        assert_eq!(count_leading_zero_bits(&h), 9);
    }

    #[test]
    fn difficulty_counts_hex_digits() {
        let mut h = [0xffu8; 32];
        h[0] = 0x00;
        h[1] = 0x0a;
        assert_eq!(leading_zero_hex_digits(&h), 3);
        assert!(meets_difficulty(&h, 0));
        assert!(meets_difficulty(&h, 3));
        assert!(!meets_difficulty(&h, 4));
    }

    #[test]
    fn zero_difficulty_accepts_anything() {
        assert!(meets_difficulty(&[0xff; 32], 0));
    }

    #[test]
    fn oversized_difficulty_never_overflows() {
        assert!(!meets_difficulty(&[0x01; 32], u32::MAX));
    }

    #[test]
    fn control_reports_cancellation() {
        let control = MiningControl::new();
        assert_eq!(control.check(), Ok(()));
        control.cancel_token().cancel();
        assert_eq!(control.check(), Err(MineError::Cancelled));
    }

    #[test]
    fn control_reports_past_deadline() {
        let control = MiningControl::new().with_deadline(Instant::now());
        assert_eq!(control.check(), Err(MineError::DeadlineExceeded));
        let relaxed = MiningControl::new().with_timeout(Duration::from_secs(60));
        assert_eq!(relaxed.check(), Ok(()));
    }
}
