use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use cdl_crypto::{DocumentSigner, KeyedDigestSigner, MerkleProof};
use cdl_types::{
    Block, ConditionKind, ContractId, ContractStatus, ContractType, Document, DocumentId,
    SmartContract, VerificationResult,
};

use crate::audit::{AuditEvent, AuditEventType, AuditSink, Severity, TracingAuditSink};
use crate::chain::{Chain, IntegrityReport};
use crate::clock::{Clock, SystemClock};
use crate::config::LedgerConfig;
use crate::contract::ContractEngine;
use crate::effects::{EffectHandler, StandardEffects};
use crate::error::LedgerError;
use crate::registry::{NewDocument, Registry};
use crate::sealer::Sealer;
use crate::traits::DocumentVerifier;
use crate::verify::Verifier;

/// Point-in-time ledger summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub chain_length: usize,
    pub pending_count: usize,
    pub document_count: usize,
    pub active_contracts: usize,
    pub executed_contracts: usize,
    pub last_sealed_at: Option<DateTime<Utc>>,
    pub chain_intact: bool,
    pub difficulty: u32,
}

/// The civic document ledger.
///
/// Composes the registry, sealer, chain, and contract engine behind one
/// thread-safe handle. Share it as `Arc<Ledger>`.
pub struct Ledger {
    config: LedgerConfig,
    registry: Registry,
    chain: Chain,
    sealer: Sealer,
    contracts: ContractEngine,
    signer: Arc<dyn DocumentSigner>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

/// Builder for [`Ledger`] with injectable collaborators.
pub struct LedgerBuilder {
    config: LedgerConfig,
    signer: Arc<dyn DocumentSigner>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    effects: Arc<dyn EffectHandler>,
}

impl LedgerBuilder {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            signer: Arc::new(KeyedDigestSigner::new()),
            audit: Arc::new(TracingAuditSink),
            clock: Arc::new(SystemClock),
            effects: Arc::new(StandardEffects::default()),
        }
    }

    pub fn signer(mut self, signer: Arc<dyn DocumentSigner>) -> Self {
        self.signer = signer;
        self
    }

    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn effects(mut self, effects: Arc<dyn EffectHandler>) -> Self {
        self.effects = effects;
        self
    }

    pub fn build(self) -> Result<Ledger, LedgerError> {
        self.config.validate()?;
        let chain = Chain::new(self.clock.now())?;
        Ok(Ledger {
            sealer: Sealer::new(self.config.difficulty, self.config.max_nonce),
            config: self.config,
            registry: Registry::new(),
            chain,
            contracts: ContractEngine::new(self.effects),
            signer: self.signer,
            audit: self.audit,
            clock: self.clock,
        })
    }
}

impl Ledger {
    /// A ledger with default collaborators.
    pub fn new(config: LedgerConfig) -> Result<Self, LedgerError> {
        LedgerBuilder::new(config).build()
    }

    pub fn builder(config: LedgerConfig) -> LedgerBuilder {
        LedgerBuilder::new(config)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn register_document(&self, request: NewDocument) -> Result<Document, LedgerError> {
        let now = self.clock.now();
        let document_type = request.document_type.clone();
        match self
            .registry
            .register(request, self.signer.as_ref(), &self.config.issuer_role, now)
        {
            Ok(document) => {
                self.audit(
                    AuditEvent::new(AuditEventType::Register, now)
                        .detail("document_id", document.id)
                        .detail("document_type", &document.document_type)
                        .detail("subject_id", &document.subject_id),
                );
                Ok(document)
            }
            Err(err) => {
                self.audit(
                    AuditEvent::new(AuditEventType::Register, now)
                        .failed(Severity::Warning)
                        .detail("document_type", document_type)
                        .detail("error", &err),
                );
                Err(err)
            }
        }
    }

    pub fn find_document(&self, id: &DocumentId) -> Result<Option<Document>, LedgerError> {
        self.registry.find(id)
    }

    /// Like [`Ledger::find_document`], failing with `DocumentNotFound`.
    pub fn require_document(&self, id: &DocumentId) -> Result<Document, LedgerError> {
        self.registry
            .find(id)?
            .ok_or(LedgerError::DocumentNotFound(*id))
    }

    pub fn documents_for_subject(&self, subject_id: &str) -> Result<Vec<Document>, LedgerError> {
        self.registry.documents_for(subject_id)
    }

    pub fn pending_documents(&self) -> Result<Vec<Document>, LedgerError> {
        self.registry.pending()
    }

    pub fn countersign_document(
        &self,
        id: &DocumentId,
        signer_id: &str,
        signer_role: &str,
    ) -> Result<Document, LedgerError> {
        let now = self.clock.now();
        let document =
            self.registry
                .countersign(id, self.signer.as_ref(), signer_id, signer_role, now)?;
        self.audit(
            AuditEvent::new(AuditEventType::Countersign, now)
                .detail("document_id", id)
                .detail("signer_id", signer_id)
                .detail("version", document.version),
        );
        Ok(document)
    }

    pub fn revoke_document(&self, id: &DocumentId, reason: &str) -> Result<Document, LedgerError> {
        let now = self.clock.now();
        let document = self.registry.revoke(id)?;
        self.audit(
            AuditEvent::new(AuditEventType::Revoke, now)
                .severity(Severity::Warning)
                .detail("document_id", id)
                .detail("reason", reason),
        );
        Ok(document)
    }

    /// Seal every pending document into one new block.
    ///
    /// `Ok(None)` when nothing is pending.
    pub fn seal_pending_batch(&self) -> Result<Option<Arc<Block>>, LedgerError> {
        let now = self.clock.now();
        match self.sealer.seal_pending_batch(&self.registry, &self.chain, now) {
            Ok(Some(block)) => {
                self.audit(
                    AuditEvent::new(AuditEventType::Seal, now)
                        .detail("block_index", block.index)
                        .detail("block_hash", block.hash)
                        .detail("documents", block.documents.len())
                        .detail("nonce", block.nonce),
                );
                Ok(Some(block))
            }
            Ok(None) => Ok(None),
            Err(err @ LedgerError::SealingInProgress) => Err(err),
            Err(err) => {
                self.audit(
                    AuditEvent::new(AuditEventType::Seal, now)
                        .failed(Severity::Warning)
                        .detail("error", &err),
                );
                Err(err)
            }
        }
    }

    /// Run a sealing pass on the blocking pool.
    pub async fn seal_in_background(self: &Arc<Self>) -> Result<Option<Arc<Block>>, LedgerError> {
        let ledger = Arc::clone(self);
        tokio::task::spawn_blocking(move || ledger.seal_pending_batch())
            .await
            .map_err(|e| LedgerError::BackgroundTask(e.to_string()))?
    }

    pub fn blocks(&self) -> Result<Vec<Arc<Block>>, LedgerError> {
        self.chain.blocks()
    }

    pub fn block(&self, index: u64) -> Result<Option<Arc<Block>>, LedgerError> {
        self.chain.block(index)
    }

    pub fn chain_length(&self) -> Result<usize, LedgerError> {
        self.chain.len()
    }

    pub fn verify_chain_integrity(&self) -> Result<IntegrityReport, LedgerError> {
        let report = self.chain.verify_integrity(self.config.difficulty)?;
        if let Some(failure) = &report.failure {
            warn!(index = failure.index, reason = %failure.reason, "chain integrity check failed");
        }
        Ok(report)
    }

    pub fn is_chain_intact(&self) -> Result<bool, LedgerError> {
        Ok(self.verify_chain_integrity()?.valid)
    }

    /// Grade a document. Never fails: unknown documents grade `invalid`.
    pub fn verify_document(&self, id: &DocumentId) -> VerificationResult {
        let now = self.clock.now();
        let result = self.verifier().verify(id, now).unwrap_or_else(|err| {
            error!(document_id = %id, error = %err, "verification could not read ledger state");
            VerificationResult::not_found(*id, now)
        });

        let event = AuditEvent::new(AuditEventType::Verify, now)
            .detail("document_id", id)
            .detail("level", result.level)
            .detail("passed", result.passed);
        let event = if result.sealed && !result.checks.chain_integrity {
            event.failed(Severity::Critical)
        } else if !result.is_valid {
            event.failed(Severity::Info)
        } else {
            event
        };
        self.audit(event);
        result
    }

    /// Merkle inclusion proof of a sealed document; `None` while pending.
    pub fn document_proof(&self, id: &DocumentId) -> Result<Option<MerkleProof>, LedgerError> {
        self.verifier().proof(id)
    }

    pub fn create_contract(
        &self,
        contract_type: ContractType,
        conditions: Vec<ConditionKind>,
        creator: &str,
    ) -> Result<SmartContract, LedgerError> {
        let now = self.clock.now();
        let contract = self
            .contracts
            .create(contract_type, conditions, creator, now)?;
        self.audit(
            AuditEvent::new(AuditEventType::ContractCreated, now)
                .detail("contract_id", contract.id)
                .detail("contract_type", contract.contract_type)
                .detail("creator", creator),
        );
        Ok(contract)
    }

    pub fn evaluate_contract(&self, id: &ContractId) -> Result<bool, LedgerError> {
        self.contracts.evaluate(id, self, self.clock.now())
    }

    /// Execute the contract's effect if every condition holds. At most once.
    pub fn try_execute_contract(&self, id: &ContractId) -> Result<bool, LedgerError> {
        let now = self.clock.now();
        let executed = self.contracts.try_execute(id, self, now)?;
        if executed {
            let summary = self
                .contracts
                .get(id)?
                .and_then(|c| c.execution)
                .map(|e| e.summary)
                .unwrap_or_default();
            self.audit(
                AuditEvent::new(AuditEventType::Execute, now)
                    .detail("contract_id", id)
                    .detail("summary", summary),
            );
        }
        Ok(executed)
    }

    pub fn cancel_contract(&self, id: &ContractId) -> Result<SmartContract, LedgerError> {
        let contract = self.contracts.cancel(id)?;
        self.audit(
            AuditEvent::new(AuditEventType::Cancel, self.clock.now()).detail("contract_id", id),
        );
        Ok(contract)
    }

    pub fn get_contract(&self, id: &ContractId) -> Result<Option<SmartContract>, LedgerError> {
        self.contracts.get(id)
    }

    pub fn list_contracts(&self) -> Result<Vec<SmartContract>, LedgerError> {
        self.contracts.list()
    }

    pub fn record_payment(&self, reference: &str, amount: u64) -> Result<u64, LedgerError> {
        self.contracts.record_payment(reference, amount)
    }

    pub fn record_approval(&self, reference: &str, approver_id: &str) -> Result<(), LedgerError> {
        self.contracts.record_approval(reference, approver_id)
    }

    pub fn stats(&self) -> Result<LedgerStats, LedgerError> {
        let report = self.chain.verify_integrity(self.config.difficulty)?;
        if let Some(failure) = &report.failure {
            error!(index = failure.index, reason = %failure.reason, "chain integrity broken");
        }
        Ok(LedgerStats {
            chain_length: self.chain.len()?,
            pending_count: self.registry.pending_count()?,
            document_count: self.registry.document_count()?,
            active_contracts: self.contracts.count_with_status(ContractStatus::Active)?,
            executed_contracts: self.contracts.count_with_status(ContractStatus::Executed)?,
            last_sealed_at: self.chain.last_sealed_at()?,
            chain_intact: report.valid,
            difficulty: self.config.difficulty,
        })
    }

    fn verifier(&self) -> Verifier<'_> {
        Verifier {
            registry: &self.registry,
            chain: &self.chain,
            signer: self.signer.as_ref(),
            difficulty: self.config.difficulty,
        }
    }

    fn audit(&self, event: AuditEvent) {
        let event_type = event.event_type;
        if let Err(err) = self.audit.record(event) {
            warn!(event = %event_type, error = %err, "audit sink rejected event");
        }
    }

    #[cfg(test)]
    pub(crate) fn chain_for_tests(&self) -> &Chain {
        &self.chain
    }
}

impl DocumentVerifier for Ledger {
    fn verify_document(&self, id: &DocumentId) -> VerificationResult {
        Ledger::verify_document(self, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditError, MemoryAuditSink, Outcome};
    use crate::clock::ManualClock;
    use cdl_crypto::{meets_difficulty, Ed25519Keyring};
    use cdl_types::{DocumentStatus, Payload, VerificationLevel};
    use chrono::Duration;

    struct Harness {
        ledger: Ledger,
        audit: Arc<MemoryAuditSink>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let audit = Arc::new(MemoryAuditSink::new());
        let clock = Arc::new(ManualClock::new(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        ));
        let ledger = Ledger::builder(LedgerConfig::with_difficulty(1))
            .audit(audit.clone())
            .clock(clock.clone())
            .build()
            .unwrap();
        Harness {
            ledger,
            audit,
            clock,
        }
    }

    fn birth_cert(subject: &str) -> NewDocument {
        NewDocument::new("birth_certificate", subject, "birth-cert-001", "registrar")
    }

    #[test]
    fn rejects_invalid_config() {
        assert!(matches!(
            Ledger::new(LedgerConfig::with_difficulty(65)),
            Err(LedgerError::Config(_))
        ));
    }

    #[test]
    fn register_seal_verify() {
        let h = harness();
        let doc = h.ledger.register_document(birth_cert("CIT-1")).unwrap();
        assert_eq!(h.ledger.verify_document(&doc.id).level, VerificationLevel::Invalid);

        h.clock.advance(Duration::seconds(5));
        let block = h.ledger.seal_pending_batch().unwrap().unwrap();
        assert!(meets_difficulty(&block.hash, 1));

        let sealed = h.ledger.require_document(&doc.id).unwrap();
        assert_eq!(sealed.status, DocumentStatus::Verified);
        assert_eq!(sealed.sealing_block_hash, Some(block.hash));

        let result = h.ledger.verify_document(&doc.id);
        assert_eq!(result.level, VerificationLevel::High);
        assert!(result.is_valid);

        let stats = h.ledger.stats().unwrap();
        assert_eq!(stats.chain_length, 2);
        assert_eq!(stats.pending_count, 0);
        assert_eq!(stats.document_count, 1);
        assert_eq!(stats.last_sealed_at, Some(block.timestamp));
        assert!(stats.chain_intact);

        assert_eq!(h.audit.count(AuditEventType::Register), 1);
        assert_eq!(h.audit.count(AuditEventType::Seal), 1);
        assert_eq!(h.audit.count(AuditEventType::Verify), 2);
    }

    #[test]
    fn empty_seal_records_nothing() {
        let h = harness();
        assert!(h.ledger.seal_pending_batch().unwrap().is_none());
        assert_eq!(h.ledger.chain_length().unwrap(), 1);
        assert_eq!(h.audit.count(AuditEventType::Seal), 0);
    }

    #[test]
    fn failed_registration_is_audited() {
        let h = harness();
        let err = h
            .ledger
            .register_document(NewDocument::new("license", "CIT-1", "", "dmv"))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidPayload(_)));
        let events = h.audit.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, Outcome::Failure);
    }

    #[test]
    fn exhausted_mining_is_audited_as_warning() {
        let audit = Arc::new(MemoryAuditSink::new());
        let config = LedgerConfig {
            difficulty: 64,
            max_nonce: 50,
            ..LedgerConfig::default()
        };
        let ledger = Ledger::builder(config).audit(audit.clone()).build().unwrap();
        ledger.register_document(birth_cert("CIT-1")).unwrap();

        assert!(matches!(
            ledger.seal_pending_batch(),
            Err(LedgerError::MiningExhausted { .. })
        ));
        let seal = audit
            .events()
            .into_iter()
            .find(|e| e.event_type == AuditEventType::Seal)
            .unwrap();
        assert_eq!(seal.severity, Severity::Warning);
        assert_eq!(seal.outcome, Outcome::Failure);
        assert_eq!(ledger.pending_documents().unwrap().len(), 1);
    }

    #[test]
    fn overlapping_seal_fails_fast_and_is_not_audited() {
        let h = harness();
        let doc = h.ledger.register_document(birth_cert("CIT-1")).unwrap();
        let ledger = &h.ledger;

        let pass = ledger
            .sealer
            .begin(&ledger.registry, &ledger.chain, h.clock.now())
            .unwrap()
            .unwrap();
        let err = std::thread::scope(|s| s.spawn(|| ledger.seal_pending_batch()).join().unwrap())
            .unwrap_err();
        assert_eq!(err, LedgerError::SealingInProgress);
        assert!(err.is_retryable());
        assert_eq!(h.audit.count(AuditEventType::Seal), 0);
        assert_eq!(ledger.pending_documents().unwrap().len(), 1);

        ledger
            .sealer
            .complete(pass, &ledger.registry, &ledger.chain)
            .unwrap();
        assert_eq!(
            ledger.require_document(&doc.id).unwrap().status,
            DocumentStatus::Verified
        );
        assert_eq!(ledger.chain_length().unwrap(), 2);
    }

    #[test]
    fn tampered_block_is_critical() {
        let h = harness();
        let doc = h.ledger.register_document(birth_cert("CIT-1")).unwrap();
        h.ledger.seal_pending_batch().unwrap();
        {
            let mut blocks = h.ledger.chain_for_tests().write().unwrap();
            let mut block = (*blocks[1]).clone();
            block.documents[0].payload = Payload::from("birth-cert-999");
            blocks[1] = Arc::new(block);
        }

        let result = h.ledger.verify_document(&doc.id);
        assert!(matches!(
            result.level,
            VerificationLevel::Low | VerificationLevel::Invalid
        ));
        assert!(!result.is_valid);

        let report = h.ledger.verify_chain_integrity().unwrap();
        assert!(!report.valid);
        assert_eq!(report.failure.unwrap().index, 1);
        assert!(!h.ledger.stats().unwrap().chain_intact);

        let verify = h.audit.events().into_iter().last().unwrap();
        assert_eq!(verify.event_type, AuditEventType::Verify);
        assert_eq!(verify.severity, Severity::Critical);
    }

    #[test]
    fn revoke_and_countersign() {
        let h = harness();
        let doc = h.ledger.register_document(birth_cert("CIT-1")).unwrap();
        assert!(matches!(
            h.ledger.revoke_document(&doc.id, "duplicate"),
            Err(LedgerError::InvalidTransition { .. })
        ));

        let amended = h
            .ledger
            .countersign_document(&doc.id, "notary-7", "notary")
            .unwrap();
        assert_eq!(amended.version, 2);
        h.ledger.seal_pending_batch().unwrap();
        assert_eq!(h.ledger.verify_document(&doc.id).passed, 5);

        h.ledger.revoke_document(&doc.id, "issued in error").unwrap();
        let result = h.ledger.verify_document(&doc.id);
        assert!(!result.checks.not_revoked);
        assert_eq!(result.level, VerificationLevel::Medium);
        assert_eq!(h.audit.count(AuditEventType::Revoke), 1);
    }

    #[test]
    fn expiry_follows_the_clock() {
        let h = harness();
        let expiry = h.clock.now() + Duration::days(30);
        let doc = h
            .ledger
            .register_document(birth_cert("CIT-1").expiring_at(expiry))
            .unwrap();
        h.ledger.seal_pending_batch().unwrap();
        assert!(h.ledger.verify_document(&doc.id).checks.not_expired);

        h.clock.advance(Duration::days(31));
        assert!(!h.ledger.verify_document(&doc.id).checks.not_expired);
    }

    #[test]
    fn document_proof_matches_block_root() {
        let h = harness();
        let first = h.ledger.register_document(birth_cert("CIT-1")).unwrap();
        h.ledger.register_document(birth_cert("CIT-2")).unwrap();
        assert!(h.ledger.document_proof(&first.id).unwrap().is_none());

        let block = h.ledger.seal_pending_batch().unwrap().unwrap();
        let proof = h.ledger.document_proof(&first.id).unwrap().unwrap();
        assert!(proof.verify());
        assert_eq!(proof.root, block.merkle_root);
    }

    #[test]
    fn ed25519_signer() {
        let keyring = Arc::new(Ed25519Keyring::new());
        keyring.enroll("registrar").unwrap();
        let ledger = Ledger::builder(LedgerConfig::with_difficulty(0))
            .signer(keyring)
            .audit(Arc::new(crate::audit::NullAuditSink))
            .build()
            .unwrap();

        let doc = ledger.register_document(birth_cert("CIT-1")).unwrap();
        assert_eq!(doc.signatures[0].algorithm, "ed25519");
        ledger.seal_pending_batch().unwrap();
        assert_eq!(ledger.verify_document(&doc.id).level, VerificationLevel::High);
    }

    #[test]
    fn failing_audit_sink_does_not_fail_operations() {
        struct Broken;
        impl AuditSink for Broken {
            fn record(&self, _event: AuditEvent) -> Result<(), AuditError> {
                Err(AuditError::Unavailable("disk full".into()))
            }
        }

        let ledger = Ledger::builder(LedgerConfig::with_difficulty(0))
            .audit(Arc::new(Broken))
            .build()
            .unwrap();
        let doc = ledger.register_document(birth_cert("CIT-1")).unwrap();
        assert!(ledger.seal_pending_batch().unwrap().is_some());
        assert!(ledger.verify_document(&doc.id).is_valid);
    }

    #[test]
    fn contract_lifecycle_through_ledger() {
        let h = harness();
        let doc = h.ledger.register_document(birth_cert("CIT-1")).unwrap();
        let contract = h
            .ledger
            .create_contract(
                ContractType::DocumentIssuance,
                vec![ConditionKind::DocumentVerified {
                    document_id: doc.id,
                }],
                "civil-registry",
            )
            .unwrap();

        assert!(!h.ledger.evaluate_contract(&contract.id).unwrap());
        assert!(!h.ledger.try_execute_contract(&contract.id).unwrap());
        h.ledger.seal_pending_batch().unwrap();
        assert!(h.ledger.evaluate_contract(&contract.id).unwrap());
        assert!(h.ledger.try_execute_contract(&contract.id).unwrap());
        assert!(!h.ledger.try_execute_contract(&contract.id).unwrap());

        let executed = h.ledger.get_contract(&contract.id).unwrap().unwrap();
        assert_eq!(executed.status, ContractStatus::Executed);
        assert!(executed.execution.is_some());
        assert_eq!(h.audit.count(AuditEventType::Execute), 1);
        assert_eq!(h.audit.count(AuditEventType::ContractCreated), 1);

        let stats = h.ledger.stats().unwrap();
        assert_eq!(stats.active_contracts, 0);
        assert_eq!(stats.executed_contracts, 1);
    }

    #[tokio::test]
    async fn seal_in_background_runs_on_blocking_pool() {
        let ledger = Arc::new(
            Ledger::builder(LedgerConfig::with_difficulty(1))
                .audit(Arc::new(crate::audit::NullAuditSink))
                .build()
                .unwrap(),
        );
        ledger.register_document(birth_cert("CIT-1")).unwrap();
        let block = ledger.seal_in_background().await.unwrap().unwrap();
        assert_eq!(block.index, 1);
        assert_eq!(ledger.chain_length().unwrap(), 2);
    }
}
