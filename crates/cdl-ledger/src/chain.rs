use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cdl_crypto::{compute_block_hash, merkle_root, ChainVerifier};
use cdl_types::{Block, Digest};

use crate::error::LedgerError;

/// First diverging block found by an integrity check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityFailure {
    pub index: u64,
    pub reason: String,
}

/// Result of walking the chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub valid: bool,
    pub blocks_checked: usize,
    pub failure: Option<IntegrityFailure>,
}

/// The append-only block chain.
///
/// Blocks are published whole behind an `Arc`, so a reader holding a
/// snapshot never sees a partially appended block.
pub struct Chain {
    blocks: RwLock<Vec<Arc<Block>>>,
}

impl Chain {
    /// A chain holding only its genesis block.
    pub fn new(genesis_time: DateTime<Utc>) -> Result<Self, LedgerError> {
        let genesis = genesis_block(genesis_time)?;
        Ok(Self {
            blocks: RwLock::new(vec![Arc::new(genesis)]),
        })
    }

    pub fn len(&self) -> Result<usize, LedgerError> {
        Ok(self.read()?.len())
    }

    /// Index and hash the next block must link to.
    pub fn tip(&self) -> Result<(u64, Digest), LedgerError> {
        let blocks = self.read()?;
        let last = blocks.last().ok_or(LedgerError::ChainConflict { expected_index: 0 })?;
        Ok((last.index, last.hash))
    }

    pub fn blocks(&self) -> Result<Vec<Arc<Block>>, LedgerError> {
        Ok(self.read()?.clone())
    }

    pub fn block(&self, index: u64) -> Result<Option<Arc<Block>>, LedgerError> {
        Ok(self.read()?.get(index as usize).cloned())
    }

    pub fn block_by_hash(&self, hash: &Digest) -> Result<Option<Arc<Block>>, LedgerError> {
        Ok(self.read()?.iter().find(|b| b.hash == *hash).cloned())
    }

    /// Timestamp of the most recently sealed (non-genesis) block.
    pub fn last_sealed_at(&self) -> Result<Option<DateTime<Utc>>, LedgerError> {
        Ok(self
            .read()?
            .last()
            .filter(|b| !b.is_genesis())
            .map(|b| b.timestamp))
    }

    /// Recompute every block hash and link, stopping at the first failure.
    pub fn verify_integrity(&self, difficulty: u32) -> Result<IntegrityReport, LedgerError> {
        let blocks = self.blocks()?;
        Ok(match ChainVerifier::verify_chain(&blocks, difficulty) {
            Ok(blocks_checked) => IntegrityReport {
                valid: true,
                blocks_checked,
                failure: None,
            },
            Err(err) => IntegrityReport {
                valid: false,
                blocks_checked: err.index() as usize + 1,
                failure: Some(IntegrityFailure {
                    index: err.index(),
                    reason: err.to_string(),
                }),
            },
        })
    }

    pub(crate) fn read(&self) -> Result<RwLockReadGuard<'_, Vec<Arc<Block>>>, LedgerError> {
        self.blocks.read().map_err(|_| LedgerError::LockPoisoned("chain"))
    }

    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<Arc<Block>>>, LedgerError> {
        self.blocks.write().map_err(|_| LedgerError::LockPoisoned("chain"))
    }
}

fn genesis_block(timestamp: DateTime<Utc>) -> Result<Block, LedgerError> {
    let mut genesis = Block {
        index: 0,
        timestamp,
        previous_hash: Digest::null(),
        hash: Digest::null(),
        nonce: 0,
        merkle_root: merkle_root(&[]),
        documents: vec![],
    };
    genesis.hash =
        compute_block_hash(&genesis).map_err(|e| LedgerError::Serialization(e.to_string()))?;
    Ok(genesis)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Chain {
        Chain::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap()).unwrap()
    }

    #[test]
    fn starts_with_genesis() {
        let chain = chain();
        assert_eq!(chain.len().unwrap(), 1);
        let genesis = chain.block(0).unwrap().unwrap();
        assert!(genesis.is_genesis());
        assert!(genesis.previous_hash.is_null());
        assert!(genesis.documents.is_empty());
        assert_eq!(chain.tip().unwrap(), (0, genesis.hash));
        assert_eq!(chain.last_sealed_at().unwrap(), None);
    }

    #[test]
    fn genesis_chain_is_intact() {
        let report = chain().verify_integrity(4).unwrap();
        assert!(report.valid);
        assert_eq!(report.blocks_checked, 1);
        assert!(report.failure.is_none());
    }

    #[test]
    fn tampered_genesis_is_reported() {
        let chain = chain();
        {
            let mut blocks = chain.write().unwrap();
            let mut genesis = (*blocks[0]).clone();
            genesis.nonce = 99;
            blocks[0] = Arc::new(genesis);
        }
        let report = chain.verify_integrity(0).unwrap();
        assert!(!report.valid);
        assert_eq!(report.failure.unwrap().index, 0);
    }

    #[test]
    fn lookup_by_hash() {
        let chain = chain();
        let genesis = chain.block(0).unwrap().unwrap();
        assert!(chain.block_by_hash(&genesis.hash).unwrap().is_some());
        assert!(chain.block_by_hash(&Digest::from_hash([5; 32])).unwrap().is_none());
        assert!(chain.block(7).unwrap().is_none());
    }
}
