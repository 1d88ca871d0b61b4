use crate::blockchain::core::chain::{Block, GENESIS_PREVIOUS_HASH};
use crate::error::{ChainError, Result};
use crate::miner::hash_meets_difficulty;

/// Checks hash integrity and linkage for every adjacent pair of blocks.
///
/// With `strict` set, the genesis block is checked too, indices must run
/// 0..n, and every hash must meet `difficulty`.
pub fn validate_chain(blocks: &[Block], difficulty: usize, strict: bool) -> Result<()> {
    if strict {
        if let Some(genesis) = blocks.first() {
            validate_genesis(genesis, difficulty)?;
        }
    }

    for pair in blocks.windows(2) {
        let (prev, curr) = (&pair[0], &pair[1]);

        if strict && curr.index != prev.index + 1 {
            return Err(ChainError::InvalidBlock(format!(
                "Invalid block index. Expected {}, but got {}.",
                prev.index + 1,
                curr.index
            )));
        }

        validate_hash(curr)?;

        if curr.previous_hash != prev.hash {
            return Err(ChainError::InvalidBlockLinkage);
        }

        if strict && !hash_meets_difficulty(&curr.hash, difficulty) {
            return Err(ChainError::InvalidProofOfWork);
        }
    }

    Ok(())
}

fn validate_genesis(genesis: &Block, difficulty: usize) -> Result<()> {
    if genesis.index != 0 || genesis.previous_hash != GENESIS_PREVIOUS_HASH {
        return Err(ChainError::InvalidBlock(
            "First block is not a genesis block.".to_string(),
        ));
    }
    validate_hash(genesis)?;
    if !hash_meets_difficulty(&genesis.hash, difficulty) {
        return Err(ChainError::InvalidProofOfWork);
    }
    Ok(())
}

fn validate_hash(block: &Block) -> Result<()> {
    let expected = block.calculate_hash();
    if block.hash != expected {
        return Err(ChainError::InvalidBlock(format!(
            "Hash mismatch at index {}. Expected {}, but got {}.",
            block.index, expected, block.hash
        )));
    }
    Ok(())
}
