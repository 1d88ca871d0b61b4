//! Proof-of-work mining
//!
//! A block satisfies difficulty `d` when its hex hash starts with `d` `'0'`
//! characters. The search is a plain nonce walk with no upper bound; for a
//! uniform digest it takes `16^d` attempts on average.

use crate::blockchain::Block;
use crate::error::{ChainError, Result};
use std::time::Instant;
use tracing::debug;

/// Largest usable difficulty: a SHA-256 hex digest has 64 characters.
pub const MAX_DIFFICULTY: usize = 64;

pub fn check_difficulty(difficulty: usize) -> Result<()> {
    if difficulty > MAX_DIFFICULTY {
        return Err(ChainError::InvalidDifficulty(difficulty));
    }
    Ok(())
}

/// Returns true if `hash` has at least `difficulty` leading zero characters.
pub fn hash_meets_difficulty(hash: &str, difficulty: usize) -> bool {
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

/// Mines `block` in place. Starts from the block's current nonce and checks
/// the current hash before incrementing.
pub fn mine(block: &mut Block, difficulty: usize) -> Result<()> {
    check_difficulty(difficulty)?;
    let start = Instant::now();
    let start_nonce = block.nonce;

    while !hash_meets_difficulty(&block.hash, difficulty) {
        block.nonce += 1;
        block.hash = block.calculate_hash();
    }

    debug!(
        index = block.index,
        difficulty,
        attempts = block.nonce - start_nonce + 1,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "block mined"
    );
    Ok(())
}

/// Consuming variant of [`mine`].
pub fn mine_block(mut block: Block, difficulty: usize) -> Result<Block> {
    mine(&mut block, difficulty)?;
    Ok(block)
}
