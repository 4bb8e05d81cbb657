use cdl_types::{Block, Digest};

use crate::merkle::merkle_root;
use crate::pow::{compute_block_hash, meets_difficulty};

/// Block chain integrity verifier.
///
/// Walks the chain once from genesis and stops at the first failure.
/// Checks, per block:
/// 1. Index equals position; genesis links to the null digest
/// 2. `previous_hash` equals the preceding block's `hash`
/// 3. `merkle_root` matches the block's document content hashes
/// 4. `hash` recomputes from the block's fields
/// 5. Non-genesis hashes meet the difficulty target
pub struct ChainVerifier;

impl ChainVerifier {
    /// Verify a chain. Returns the number of blocks checked.
    pub fn verify_chain(blocks: &[impl AsRef<Block>], difficulty: u32) -> Result<usize, ChainError> {
        let mut previous: Option<Digest> = None;

        for (position, block) in blocks.iter().enumerate() {
            let block = block.as_ref();
            Self::verify_block(block, position, previous, difficulty)?;
            previous = Some(block.hash);
        }

        Ok(blocks.len())
    }

    fn verify_block(
        block: &Block,
        position: usize,
        previous: Option<Digest>,
        difficulty: u32,
    ) -> Result<(), ChainError> {
        let index = position as u64;
        if block.index != index {
            return Err(ChainError::IndexMismatch {
                index,
                found: block.index,
            });
        }

        match previous {
            None if !block.previous_hash.is_null() || !block.documents.is_empty() => {
                return Err(ChainError::GenesisMismatch);
            }
            Some(expected) if block.previous_hash != expected => {
                return Err(ChainError::BrokenLink { index });
            }
            _ => {}
        }

        if merkle_root(&block.content_hashes()) != block.merkle_root {
            return Err(ChainError::MerkleMismatch { index });
        }

        let computed =
            compute_block_hash(block).map_err(|_| ChainError::HashMismatch { index })?;
        if computed != block.hash {
            return Err(ChainError::HashMismatch { index });
        }

        if previous.is_some() && !meets_difficulty(&block.hash, difficulty) {
            return Err(ChainError::InsufficientWork { index, difficulty });
        }

        Ok(())
    }
}

/// Errors from chain verification.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("genesis block must link to the null digest and carry no documents")]
    GenesisMismatch,

    #[error("block at position {index} records index {found}")]
    IndexMismatch { index: u64, found: u64 },

    #[error("broken link at index {index}: previous_hash does not match")]
    BrokenLink { index: u64 },

    #[error("merkle root mismatch at index {index}")]
    MerkleMismatch { index: u64 },

    #[error("hash mismatch at index {index}: computed hash differs from stored")]
    HashMismatch { index: u64 },

    #[error("block {index} does not meet difficulty {difficulty}")]
    InsufficientWork { index: u64, difficulty: u32 },
}

impl ChainError {
    /// Index of the first diverging block.
    pub fn index(&self) -> u64 {
        match self {
            Self::GenesisMismatch => 0,
            Self::IndexMismatch { index, .. }
            | Self::BrokenLink { index }
            | Self::MerkleMismatch { index }
            | Self::HashMismatch { index }
            | Self::InsufficientWork { index, .. } => *index,
        }
    }
}
