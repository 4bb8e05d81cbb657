use std::sync::Arc;

use chrono::{DateTime, Utc};

use cdl_crypto::{hash_payload, DocumentSigner, MerkleProof, MerkleTree};
use cdl_types::{
    Block, Digest, Document, DocumentId, DocumentStatus, VerificationChecks, VerificationResult,
};

use crate::chain::Chain;
use crate::error::LedgerError;
use crate::registry::Registry;

/// Runs the five document checks against the registry and the chain.
pub(crate) struct Verifier<'a> {
    pub registry: &'a Registry,
    pub chain: &'a Chain,
    pub signer: &'a dyn DocumentSigner,
    pub difficulty: u32,
}

impl Verifier<'_> {
    pub fn verify(
        &self,
        id: &DocumentId,
        now: DateTime<Utc>,
    ) -> Result<VerificationResult, LedgerError> {
        let Some(live) = self.registry.find(id)? else {
            return Ok(VerificationResult::not_found(*id, now));
        };

        let mut checks = VerificationChecks {
            not_revoked: live.status != DocumentStatus::Revoked,
            not_expired: !live.is_expired_at(now),
            chain_integrity: self.chain.verify_integrity(self.difficulty)?.valid,
            ..VerificationChecks::none()
        };

        let Some(block_hash) = live.sealing_block_hash else {
            // Pending: checked against the registry copy, never sealed.
            let digest = rederive(&live);
            checks.hash_match = digest == Some(live.content_hash);
            checks.signature_valid = digest.is_some_and(|d| self.signatures_hold(&live, &d));
            return Ok(VerificationResult::grade(*id, checks, false, None, now));
        };

        let Some((block, position)) = self.sealed_copy(id, &block_hash)? else {
            // Recorded as sealed, but the chain no longer holds it.
            let digest = rederive(&live);
            checks.signature_valid = digest.is_some_and(|d| self.signatures_hold(&live, &d));
            return Ok(VerificationResult::grade(*id, checks, false, None, now));
        };

        let snapshot = &block.documents[position];
        let digest = rederive(snapshot);
        checks.hash_match = digest == Some(live.content_hash)
            && snapshot.content_hash == live.content_hash;
        checks.signature_valid = digest.is_some_and(|d| self.signatures_hold(&live, &d));

        Ok(VerificationResult::grade(
            *id,
            checks,
            true,
            Some(block.index),
            now,
        ))
    }

    /// Inclusion proof of a sealed document within its block.
    pub fn proof(&self, id: &DocumentId) -> Result<Option<MerkleProof>, LedgerError> {
        let live = self
            .registry
            .find(id)?
            .ok_or(LedgerError::DocumentNotFound(*id))?;
        let Some(block_hash) = live.sealing_block_hash else {
            return Ok(None);
        };
        let Some(block) = self.chain.block_by_hash(&block_hash)? else {
            return Ok(None);
        };
        Ok(block
            .position_of(id)
            .and_then(|position| MerkleTree::from_leaves(block.content_hashes()).proof(position)))
    }

    /// The sealing block and the document's position in it.
    fn sealed_copy(
        &self,
        id: &DocumentId,
        block_hash: &Digest,
    ) -> Result<Option<(Arc<Block>, usize)>, LedgerError> {
        Ok(self
            .chain
            .block_by_hash(block_hash)?
            .and_then(|block| block.position_of(id).map(|position| (block, position))))
    }

    /// Every signature verifies over `digest` with the active algorithm.
    fn signatures_hold(&self, document: &Document, digest: &Digest) -> bool {
        !document.signatures.is_empty()
            && document.signatures.iter().all(|signature| {
                signature.algorithm == self.signer.algorithm()
                    && self.signer.verify(
                        digest,
                        &signature.signer_id,
                        &signature.signature_value,
                    )
            })
    }
}

fn rederive(document: &Document) -> Option<Digest> {
    hash_payload(&document.payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::NewDocument;
    use crate::sealer::Sealer;
    use cdl_crypto::KeyedDigestSigner;
    use cdl_types::{Payload, VerificationLevel};
    use chrono::Duration;

    struct Fixture {
        registry: Registry,
        chain: Chain,
        signer: KeyedDigestSigner,
        sealer: Sealer,
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                registry: Registry::new(),
                chain: Chain::new(t0()).unwrap(),
                signer: KeyedDigestSigner::new(),
                sealer: Sealer::new(1, 1_000_000),
            }
        }

        fn verifier(&self) -> Verifier<'_> {
            Verifier {
                registry: &self.registry,
                chain: &self.chain,
                signer: &self.signer,
                difficulty: 1,
            }
        }

        fn register(&self, request: NewDocument) -> DocumentId {
            self.registry
                .register(request, &self.signer, "issuer", t0())
                .unwrap()
                .id
        }

        fn seal(&self) {
            self.sealer
                .seal_pending_batch(&self.registry, &self.chain, t0())
                .unwrap();
        }
    }

    #[test]
    fn unknown_document_grades_invalid() {
        let f = Fixture::new();
        let result = f.verifier().verify(&DocumentId::new(), t0()).unwrap();
        assert_eq!(result.passed, 0);
        assert_eq!(result.level, VerificationLevel::Invalid);
        assert!(!result.is_valid);
    }

    #[test]
    fn pending_document_passes_checks_but_is_invalid() {
        let f = Fixture::new();
        let id = f.register(NewDocument::new("birth_certificate", "CIT-1", "x", "registrar"));
        let result = f.verifier().verify(&id, t0()).unwrap();

        assert!(result.checks.hash_match);
        assert!(result.checks.signature_valid);
        assert!(result.checks.chain_integrity);
        assert_eq!(result.passed, 5);
        assert!(!result.sealed);
        assert_eq!(result.level, VerificationLevel::Invalid);
        assert!(!result.is_valid);
    }

    #[test]
    fn sealed_document_grades_high() {
        let f = Fixture::new();
        let id = f.register(NewDocument::new("birth_certificate", "CIT-1", "x", "registrar"));
        f.seal();

        let result = f.verifier().verify(&id, t0()).unwrap();
        assert_eq!(result.passed, 5);
        assert_eq!(result.level, VerificationLevel::High);
        assert_eq!(result.block_index, Some(1));
        assert!(result.is_valid);
    }

    #[test]
    fn revoked_and_expired_lose_checks() {
        let f = Fixture::new();
        let expiring = f.register(
            NewDocument::new("license", "CIT-1", "x", "dmv").expiring_at(t0() + Duration::days(1)),
        );
        let revoked = f.register(NewDocument::new("license", "CIT-1", "y", "dmv"));
        f.seal();
        f.registry.revoke(&revoked).unwrap();

        let later = t0() + Duration::days(2);
        let result = f.verifier().verify(&expiring, later).unwrap();
        assert!(!result.checks.not_expired);
        assert_eq!(result.level, VerificationLevel::Medium);
        assert!(result.is_valid);

        let result = f.verifier().verify(&revoked, t0()).unwrap();
        assert!(!result.checks.not_revoked);
        assert_eq!(result.passed, 4);
    }

    #[test]
    fn tampered_snapshot_grades_low() {
        let f = Fixture::new();
        let id = f.register(NewDocument::new("birth_certificate", "CIT-1", "x", "registrar"));
        f.seal();
        {
            let mut blocks = f.chain.write().unwrap();
            let mut block = (*blocks[1]).clone();
            block.documents[0].payload = Payload::from("forged");
            blocks[1] = Arc::new(block);
        }

        let result = f.verifier().verify(&id, t0()).unwrap();
        assert!(!result.checks.hash_match);
        assert!(!result.checks.signature_valid);
        assert!(!result.checks.chain_integrity);
        assert_eq!(result.level, VerificationLevel::Low);
        assert!(!result.is_valid);
    }

    #[test]
    fn signature_from_other_algorithm_fails() {
        let f = Fixture::new();
        let id = f.register(NewDocument::new("license", "CIT-1", "x", "dmv"));
        f.seal();
        f.registry
            .write()
            .unwrap()
            .documents
            .get_mut(&id)
            .unwrap()
            .signatures[0]
            .algorithm = "ed25519".into();

        let result = f.verifier().verify(&id, t0()).unwrap();
        assert!(!result.checks.signature_valid);
        assert_eq!(result.passed, 4);
    }

    #[test]
    fn missing_sealing_block_is_not_sealed() {
        let f = Fixture::new();
        let id = f.register(NewDocument::new("license", "CIT-1", "x", "dmv"));
        f.seal();
        f.chain.write().unwrap().truncate(1);

        let result = f.verifier().verify(&id, t0()).unwrap();
        assert!(!result.sealed);
        assert!(!result.checks.hash_match);
        assert!(result.checks.chain_integrity);
        assert_eq!(result.level, VerificationLevel::Invalid);
    }

    #[test]
    fn proof_for_sealed_document() {
        let f = Fixture::new();
        let pending = f.register(NewDocument::new("license", "CIT-1", "x", "dmv"));
        assert!(f.verifier().proof(&pending).unwrap().is_none());

        f.register(NewDocument::new("license", "CIT-2", "y", "dmv"));
        f.register(NewDocument::new("license", "CIT-3", "z", "dmv"));
        f.seal();

        let proof = f.verifier().proof(&pending).unwrap().unwrap();
        assert!(proof.verify());
        assert_eq!(proof.root, f.chain.block(1).unwrap().unwrap().merkle_root);
        assert!(matches!(
            f.verifier().proof(&DocumentId::new()),
            Err(LedgerError::DocumentNotFound(_))
        ));
    }
}
