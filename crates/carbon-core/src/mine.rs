use crate::{
    block::{Block, Candidate},
    constants::NONCE_WINDOW,
    pow::{meets_difficulty, MineError, MiningControl},
};
use rayon::prelude::*;
use tracing::{debug, info};

/// Searches for the smallest nonce whose header hash has at least `difficulty`
/// leading zero hex digits and returns the sealed block.
///
/// The nonce space is walked in windows of `NONCE_WINDOW`. Each window is
/// searched in parallel with `find_first`, which still yields the lowest
/// matching nonce; cancellation and the deadline are checked between windows.
pub fn mine(
    candidate: Candidate,
    difficulty: u32,
    control: &MiningControl,
) -> Result<Block, MineError> {
    control.check()?;
    debug!(
        index = candidate.index(),
        difficulty, "mining candidate block"
    );

    let mut start = 0u64;
    loop {
        let end = start.saturating_add(NONCE_WINDOW);
        let found = (start..end)
            .into_par_iter()
            .find_first(|nonce| meets_difficulty(&candidate.hash_with_nonce(*nonce), difficulty));

        if let Some(nonce) = found {
            let block = candidate.seal(nonce);
            info!(
                "Mined block {} with nonce {} and hash {}",
                block.index,
                nonce,
                block.hash_hex()
            );
            return Ok(block);
        }
        if end == u64::MAX {
            return Err(MineError::NonceSpaceExhausted);
        }
        start = end;
        control.check()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        pow::{leading_zero_hex_digits, CancelToken},
        TokenOperation,
    };
    use std::time::{Duration, Instant};

    fn candidate() -> Candidate {
        Candidate::new(
            1,
            [0u8; 32],
            1_600_000_000_000,
            vec![TokenOperation::transfer("Alice", "Bob", 10).into()],
        )
    }

    #[test]
    fn mine_block_example() {
        let mined = mine(candidate(), 3, &MiningControl::new()).unwrap();
        assert!(leading_zero_hex_digits(&mined.hash) >= 3);
        assert!(mined.is_internally_consistent());
    }

    #[test]
    fn mine_returns_smallest_nonce() {
        let template = candidate();
        let mined = mine(template.clone(), 2, &MiningControl::new()).unwrap();
        for nonce in 0..mined.nonce {
            assert!(!meets_difficulty(&template.hash_with_nonce(nonce), 2));
        }
    }

    #[test]
    fn zero_difficulty_takes_nonce_zero() {
        let mined = mine(candidate(), 0, &MiningControl::new()).unwrap();
        assert_eq!(mined.nonce, 0);
    }

    #[test]
    fn cancelled_search_returns_error() {
        let token = CancelToken::new();
        token.cancel();
        let control = MiningControl::new().with_cancel_token(token);
        assert_eq!(mine(candidate(), 2, &control), Err(MineError::Cancelled));
    }

    #[test]
    fn cancellation_from_another_thread_stops_unbounded_search() {
        let control = MiningControl::new();
        let token = control.cancel_token();
        let handle = std::thread::spawn(move || {
            // 64 zero hex digits is unreachable.
            mine(candidate(), 64, &control)
        });
        std::thread::sleep(Duration::from_millis(50));
        token.cancel();
        assert_eq!(handle.join().unwrap(), Err(MineError::Cancelled));
    }

    #[test]
    fn deadline_stops_unbounded_search() {
        let control = MiningControl::new().with_deadline(Instant::now() + Duration::from_millis(50));
        assert_eq!(
            mine(candidate(), 64, &control),
            Err(MineError::DeadlineExceeded)
        );
    }
}
