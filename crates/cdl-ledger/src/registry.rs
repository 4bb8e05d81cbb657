use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::debug;

use cdl_crypto::{hash_payload, DocumentSigner, HasherError};
use cdl_types::{
    Digest, Document, DocumentId, DocumentSignature, DocumentStatus, Payload,
};

use crate::error::LedgerError;

/// Request to register a new document.
#[derive(Clone, Debug)]
pub struct NewDocument {
    pub document_type: String,
    pub subject_id: String,
    pub payload: Payload,
    pub issuer_id: String,
    pub issuer_role: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewDocument {
    pub fn new(
        document_type: impl Into<String>,
        subject_id: impl Into<String>,
        payload: impl Into<Payload>,
        issuer_id: impl Into<String>,
    ) -> Self {
        Self {
            document_type: document_type.into(),
            subject_id: subject_id.into(),
            payload: payload.into(),
            issuer_id: issuer_id.into(),
            issuer_role: None,
            expires_at: None,
        }
    }

    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Override the ledger's configured issuer role for this document.
    pub fn with_issuer_role(mut self, role: impl Into<String>) -> Self {
        self.issuer_role = Some(role.into());
        self
    }

    fn validate(&self) -> Result<(), LedgerError> {
        for (field, value) in [
            ("document_type", &self.document_type),
            ("subject_id", &self.subject_id),
            ("issuer_id", &self.issuer_id),
        ] {
            if value.trim().is_empty() {
                return Err(LedgerError::InvalidPayload(format!("{field} is empty")));
            }
        }
        Ok(())
    }
}

/// Document registry: creation, lookup, and status transitions.
///
/// Owns the pending queue consumed by the sealer. Registration never
/// touches the chain.
#[derive(Default)]
pub struct Registry {
    state: RwLock<RegistryState>,
}

#[derive(Default)]
pub(crate) struct RegistryState {
    pub(crate) documents: HashMap<DocumentId, Document>,
    /// Registration order of unsealed documents.
    pub(crate) pending: Vec<DocumentId>,
    /// Registration order per subject.
    by_subject: HashMap<String, Vec<DocumentId>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pending document, signed by its issuer, and enqueue it.
    pub fn register(
        &self,
        request: NewDocument,
        signer: &dyn DocumentSigner,
        default_role: &str,
        now: DateTime<Utc>,
    ) -> Result<Document, LedgerError> {
        request.validate()?;
        let content_hash = hash_payload(&request.payload).map_err(|e| match e {
            HasherError::EmptyPayload => LedgerError::InvalidPayload("payload is empty".into()),
            HasherError::Serialization(msg) => LedgerError::InvalidPayload(msg),
        })?;

        let role = request
            .issuer_role
            .unwrap_or_else(|| default_role.to_string());
        let issuer_signature = sign(signer, &content_hash, &request.issuer_id, role, now)?;

        let document = Document {
            id: DocumentId::new(),
            document_type: request.document_type,
            subject_id: request.subject_id,
            payload: request.payload,
            content_hash,
            sealing_block_hash: None,
            issued_at: now,
            status: DocumentStatus::Pending,
            signatures: vec![issuer_signature],
            version: 1,
            expires_at: request.expires_at,
        };

        let mut state = self.write()?;
        state
            .by_subject
            .entry(document.subject_id.clone())
            .or_default()
            .push(document.id);
        state.pending.push(document.id);
        state.documents.insert(document.id, document.clone());

        debug!(id = %document.id, kind = %document.document_type, hash = %document.content_hash.short_hex(), "document registered");
        Ok(document)
    }

    pub fn find(&self, id: &DocumentId) -> Result<Option<Document>, LedgerError> {
        Ok(self.read()?.documents.get(id).cloned())
    }

    /// All documents for a subject, most recent first.
    pub fn documents_for(&self, subject_id: &str) -> Result<Vec<Document>, LedgerError> {
        let state = self.read()?;
        let Some(ids) = state.by_subject.get(subject_id) else {
            return Ok(vec![]);
        };
        let mut documents: Vec<Document> = ids
            .iter()
            .rev()
            .filter_map(|id| state.documents.get(id).cloned())
            .collect();
        // stable: ties keep later registrations first
        documents.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        Ok(documents)
    }

    /// The pending queue in registration order.
    pub fn pending(&self) -> Result<Vec<Document>, LedgerError> {
        let state = self.read()?;
        Ok(state
            .pending
            .iter()
            .filter_map(|id| state.documents.get(id).cloned())
            .collect())
    }

    pub fn pending_count(&self) -> Result<usize, LedgerError> {
        Ok(self.read()?.pending.len())
    }

    pub fn document_count(&self) -> Result<usize, LedgerError> {
        Ok(self.read()?.documents.len())
    }

    /// Append a signature over the content hash and bump the version.
    pub fn countersign(
        &self,
        id: &DocumentId,
        signer: &dyn DocumentSigner,
        signer_id: &str,
        signer_role: &str,
        now: DateTime<Utc>,
    ) -> Result<Document, LedgerError> {
        if signer_id.trim().is_empty() {
            return Err(LedgerError::InvalidPayload("signer_id is empty".into()));
        }
        let mut state = self.write()?;
        let document = state
            .documents
            .get_mut(id)
            .ok_or(LedgerError::DocumentNotFound(*id))?;
        if document.status == DocumentStatus::Revoked {
            return Err(LedgerError::InvalidTransition {
                id: *id,
                from: document.status,
                action: "countersign",
            });
        }

        let signature = sign(
            signer,
            &document.content_hash,
            signer_id,
            signer_role.to_string(),
            now,
        )?;
        document.signatures.push(signature);
        document.version += 1;
        Ok(document.clone())
    }

    /// Revoke a sealed document. Only `verified` documents can be revoked.
    pub fn revoke(&self, id: &DocumentId) -> Result<Document, LedgerError> {
        let mut state = self.write()?;
        let document = state
            .documents
            .get_mut(id)
            .ok_or(LedgerError::DocumentNotFound(*id))?;
        if document.status != DocumentStatus::Verified {
            return Err(LedgerError::InvalidTransition {
                id: *id,
                from: document.status,
                action: "revoke",
            });
        }
        document.status = DocumentStatus::Revoked;
        document.version += 1;
        Ok(document.clone())
    }

    pub(crate) fn read(&self) -> Result<RwLockReadGuard<'_, RegistryState>, LedgerError> {
        self.state
            .read()
            .map_err(|_| LedgerError::LockPoisoned("registry"))
    }

    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, RegistryState>, LedgerError> {
        self.state
            .write()
            .map_err(|_| LedgerError::LockPoisoned("registry"))
    }
}

impl RegistryState {
    /// Mark sealed documents verified and drop them from the pending queue.
    ///
    /// Only the sealer calls this.
    pub(crate) fn stamp_sealed(&mut self, sealed: &[DocumentId], block_hash: Digest) {
        for id in sealed {
            if let Some(document) = self.documents.get_mut(id) {
                document.sealing_block_hash = Some(block_hash);
                document.status = DocumentStatus::Verified;
            }
        }
        self.pending.retain(|id| !sealed.contains(id));
    }
}

fn sign(
    signer: &dyn DocumentSigner,
    digest: &Digest,
    signer_id: &str,
    signer_role: String,
    now: DateTime<Utc>,
) -> Result<DocumentSignature, LedgerError> {
    let signature_value = signer
        .sign(digest, signer_id)
        .map_err(|e| LedgerError::Signing(e.to_string()))?;
    Ok(DocumentSignature {
        signer_id: signer_id.to_string(),
        signer_role,
        signature_value,
        signed_at: now,
        algorithm: signer.algorithm().to_string(),
    })
}
