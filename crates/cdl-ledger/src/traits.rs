use cdl_types::{DocumentId, VerificationResult};

/// Read boundary used by contract conditions that reference documents.
///
/// Verification is total: an unknown or tampered document yields a graded
/// result, never an error.
pub trait DocumentVerifier: Send + Sync {
    fn verify_document(&self, id: &DocumentId) -> VerificationResult;
}
