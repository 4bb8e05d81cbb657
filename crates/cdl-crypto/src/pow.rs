use chrono::{DateTime, Utc};

use cdl_types::{Block, Digest, Document};

use crate::hasher::{ContentHasher, HasherError};

/// Incremental block hasher for the proof-of-work search.
///
/// Block hash = H(index ∥ previous_hash ∥ timestamp ∥ documents ∥ nonce ∥
/// merkle_root). Everything before the nonce is fixed for a sealing pass,
/// so the prefix state is built once and cloned for every nonce tried.
pub struct BlockHasher {
    prefix: blake3::Hasher,
    merkle_root: Digest,
}

impl BlockHasher {
    pub fn new(
        index: u64,
        previous_hash: &Digest,
        timestamp: DateTime<Utc>,
        documents: &[Document],
        merkle_root: Digest,
    ) -> Result<Self, HasherError> {
        let serialized = serde_json::to_vec(documents)
            .map_err(|e| HasherError::Serialization(e.to_string()))?;

        let mut prefix = ContentHasher::BLOCK.start();
        prefix.update(&index.to_le_bytes());
        prefix.update(previous_hash.as_bytes());
        prefix.update(&timestamp.timestamp().to_le_bytes());
        prefix.update(&timestamp.timestamp_subsec_nanos().to_le_bytes());
        prefix.update(&(serialized.len() as u64).to_le_bytes());
        prefix.update(&serialized);

        Ok(Self {
            prefix,
            merkle_root,
        })
    }

    /// Prepare a hasher from an existing block's fields.
    pub fn for_block(block: &Block) -> Result<Self, HasherError> {
        Self::new(
            block.index,
            &block.previous_hash,
            block.timestamp,
            &block.documents,
            block.merkle_root,
        )
    }

    /// Block hash for a candidate nonce.
    pub fn hash_with_nonce(&self, nonce: u64) -> Digest {
        let mut hasher = self.prefix.clone();
        hasher.update(&nonce.to_le_bytes());
        hasher.update(self.merkle_root.as_bytes());
        Digest::from_hash(*hasher.finalize().as_bytes())
    }

    /// Search nonces `0..=max_nonce` for a hash meeting `difficulty`.
    ///
    /// Returns the first `(nonce, hash)` found, or `None` once the range is
    /// exhausted.
    pub fn search(&self, difficulty: u32, max_nonce: u64) -> Option<(u64, Digest)> {
        (0..=max_nonce)
            .map(|nonce| (nonce, self.hash_with_nonce(nonce)))
            .find(|(_, hash)| meets_difficulty(hash, difficulty))
    }
}

/// Recompute a block's hash from its stored fields.
pub fn compute_block_hash(block: &Block) -> Result<Digest, HasherError> {
    Ok(BlockHasher::for_block(block)?.hash_with_nonce(block.nonce))
}

/// Returns `true` if `hash` has at least `difficulty` leading zero hex digits.
pub fn meets_difficulty(hash: &Digest, difficulty: u32) -> bool {
    hash.leading_zero_nibbles() >= difficulty
}
