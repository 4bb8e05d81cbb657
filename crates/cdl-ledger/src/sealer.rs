use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use cdl_crypto::{merkle_root, BlockHasher};
use cdl_types::{Block, Digest, Document, DocumentId};

use crate::chain::Chain;
use crate::error::LedgerError;
use crate::registry::Registry;

/// Proof-of-work block sealer.
///
/// The only path by which a document becomes `verified`. At most one
/// sealing pass runs at a time; a concurrent attempt fails fast with
/// [`LedgerError::SealingInProgress`] instead of queueing.
pub struct Sealer {
    difficulty: u32,
    max_nonce: u64,
    in_flight: Mutex<()>,
}

impl Sealer {
    pub fn new(difficulty: u32, max_nonce: u64) -> Self {
        Self {
            difficulty,
            max_nonce,
            in_flight: Mutex::new(()),
        }
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Seal the current pending queue into a new block.
    ///
    /// Returns `Ok(None)` when nothing is pending. Documents registered while
    /// the nonce search runs are left for the next pass.
    pub fn seal_pending_batch(
        &self,
        registry: &Registry,
        chain: &Chain,
        now: DateTime<Utc>,
    ) -> Result<Option<Arc<Block>>, LedgerError> {
        match self.begin(registry, chain, now)? {
            Some(pass) => self.complete(pass, registry, chain).map(Some),
            None => Ok(None),
        }
    }

    /// Claim the sealer and snapshot the pending queue.
    pub(crate) fn begin(
        &self,
        registry: &Registry,
        chain: &Chain,
        now: DateTime<Utc>,
    ) -> Result<Option<SealPass<'_>>, LedgerError> {
        let guard = match self.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(LedgerError::SealingInProgress),
            Err(TryLockError::Poisoned(_)) => return Err(LedgerError::LockPoisoned("sealer")),
        };

        let documents = registry.pending()?;
        if documents.is_empty() {
            debug!("no pending documents to seal");
            return Ok(None);
        }

        let (tip_index, previous_hash) = chain.tip()?;
        Ok(Some(SealPass {
            _guard: guard,
            index: tip_index + 1,
            previous_hash,
            timestamp: now,
            documents,
        }))
    }

    /// Mine the snapshot taken by [`Sealer::begin`] and publish it.
    pub(crate) fn complete(
        &self,
        pass: SealPass<'_>,
        registry: &Registry,
        chain: &Chain,
    ) -> Result<Arc<Block>, LedgerError> {
        let SealPass {
            _guard,
            index,
            previous_hash,
            timestamp,
            documents,
        } = pass;

        let root = merkle_root(&documents.iter().map(|d| d.content_hash).collect::<Vec<_>>());
        let hasher = BlockHasher::new(index, &previous_hash, timestamp, &documents, root)
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;

        let started = Instant::now();
        let (nonce, hash) = hasher.search(self.difficulty, self.max_nonce).ok_or(
            LedgerError::MiningExhausted {
                attempts: self.max_nonce,
                difficulty: self.difficulty,
            },
        )?;

        let sealed: Vec<DocumentId> = documents.iter().map(|d| d.id).collect();
        let block = Arc::new(Block {
            index,
            timestamp,
            previous_hash,
            hash,
            nonce,
            merkle_root: root,
            documents,
        });

        // Publish under both write locks (registry first, then chain) so
        // readers see either the pre-seal or the post-seal state.
        let mut registry_state = registry.write()?;
        let mut blocks = chain.write()?;
        if blocks.last().map(|b| b.hash) != Some(previous_hash) {
            return Err(LedgerError::ChainConflict {
                expected_index: index,
            });
        }
        blocks.push(Arc::clone(&block));
        registry_state.stamp_sealed(&sealed, hash);

        info!(
            index,
            nonce,
            documents = sealed.len(),
            hash = %hash.short_hex(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "block sealed"
        );
        Ok(block)
    }
}

/// A claimed sealing pass: the pending snapshot and the tip it extends.
///
/// Holds the sealer until completed or dropped.
pub(crate) struct SealPass<'a> {
    _guard: MutexGuard<'a, ()>,
    index: u64,
    previous_hash: Digest,
    timestamp: DateTime<Utc>,
    documents: Vec<Document>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::NewDocument;
    use cdl_crypto::{meets_difficulty, KeyedDigestSigner};
    use cdl_types::DocumentStatus;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn setup() -> (Registry, Chain) {
        (Registry::new(), Chain::new(now()).unwrap())
    }

    fn register(registry: &Registry, payload: &str) -> DocumentId {
        registry
            .register(
                NewDocument::new("digital_identity", "CIT-3", payload, "registrar"),
                &KeyedDigestSigner::new(),
                "issuer",
                now(),
            )
            .unwrap()
            .id
    }

    #[test]
    fn empty_queue_is_a_noop() {
        let (registry, chain) = setup();
        let sealer = Sealer::new(1, 1_000_000);
        assert!(sealer.seal_pending_batch(&registry, &chain, now()).unwrap().is_none());
        assert_eq!(chain.len().unwrap(), 1);
    }

    #[test]
    fn seals_all_pending_documents() {
        let (registry, chain) = setup();
        let a = register(&registry, "a");
        let b = register(&registry, "b");
        let sealer = Sealer::new(2, 1_000_000);

        let block = sealer.seal_pending_batch(&registry, &chain, now()).unwrap().unwrap();

        assert_eq!(block.index, 1);
        assert_eq!(block.documents.len(), 2);
        assert!(meets_difficulty(&block.hash, 2));
        assert_eq!(block.previous_hash, chain.block(0).unwrap().unwrap().hash);
        assert_eq!(registry.pending_count().unwrap(), 0);
        for id in [a, b] {
            let doc = registry.find(&id).unwrap().unwrap();
            assert_eq!(doc.status, DocumentStatus::Verified);
            assert_eq!(doc.sealing_block_hash, Some(block.hash));
        }
        // the block keeps the pre-seal snapshot
        assert!(block.documents.iter().all(|d| d.status == DocumentStatus::Pending));
        assert!(chain.verify_integrity(2).unwrap().valid);
    }

    #[test]
    fn exhausted_search_leaves_queue_intact() {
        let (registry, chain) = setup();
        register(&registry, "a");
        let sealer = Sealer::new(64, 100);

        let err = sealer.seal_pending_batch(&registry, &chain, now()).unwrap_err();
        assert_eq!(
            err,
            LedgerError::MiningExhausted {
                attempts: 100,
                difficulty: 64
            }
        );
        assert_eq!(registry.pending_count().unwrap(), 1);
        assert_eq!(chain.len().unwrap(), 1);
    }

    #[test]
    fn concurrent_pass_is_rejected() {
        let (registry, chain) = setup();
        register(&registry, "a");
        let sealer = Sealer::new(0, 10);

        let _held = sealer.in_flight.lock().unwrap();
        assert_eq!(
            sealer.seal_pending_batch(&registry, &chain, now()).unwrap_err(),
            LedgerError::SealingInProgress
        );
    }

    #[test]
    fn each_document_lands_in_exactly_one_block() {
        let (registry, chain) = setup();
        let sealer = Sealer::new(1, 1_000_000);
        let first = register(&registry, "a");
        sealer.seal_pending_batch(&registry, &chain, now()).unwrap();
        let second = register(&registry, "b");
        sealer.seal_pending_batch(&registry, &chain, now()).unwrap();

        let blocks = chain.blocks().unwrap();
        assert_eq!(blocks.len(), 3);
        assert!(blocks[1].document(&first).is_some());
        assert!(blocks[1].document(&second).is_none());
        assert!(blocks[2].document(&second).is_some());
        assert!(blocks[2].document(&first).is_none());
    }

    #[test]
    fn registration_during_search_waits_for_next_block() {
        let (registry, chain) = setup();
        let sealer = Sealer::new(4, 10_000_000);
        let d1 = register(&registry, "a");

        let pass = sealer.begin(&registry, &chain, now()).unwrap().unwrap();
        let d2 = std::thread::scope(|s| s.spawn(|| register(&registry, "b")).join().unwrap());
        assert_eq!(
            sealer.seal_pending_batch(&registry, &chain, now()).unwrap_err(),
            LedgerError::SealingInProgress
        );
        let first = sealer.complete(pass, &registry, &chain).unwrap();

        assert_eq!(first.documents.len(), 1);
        assert!(first.document(&d1).is_some());
        let late = registry.find(&d2).unwrap().unwrap();
        assert_eq!(late.status, DocumentStatus::Pending);
        assert!(late.sealing_block_hash.is_none());

        let second = sealer.seal_pending_batch(&registry, &chain, now()).unwrap().unwrap();
        assert_eq!(second.index, 2);
        assert_eq!(second.documents.len(), 1);
        assert!(second.document(&d2).is_some());
        assert_eq!(
            registry.find(&d2).unwrap().unwrap().sealing_block_hash,
            Some(second.hash)
        );
    }
}
