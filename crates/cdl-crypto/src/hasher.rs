use cdl_types::{Digest, Payload};

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g., `"cdl-document-v1"`) that is
/// prepended to every hash computation, so a document payload and a Merkle
/// node with identical bytes never share a digest.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for document payloads.
    pub const DOCUMENT: Self = Self {
        domain: "cdl-document-v1",
    };
    /// Hasher for Merkle tree nodes.
    pub const MERKLE: Self = Self {
        domain: "cdl-merkle-v1",
    };
    /// Hasher for block headers.
    pub const BLOCK: Self = Self {
        domain: "cdl-block-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> Digest {
        let mut hasher = self.start();
        hasher.update(data);
        Digest::from_hash(*hasher.finalize().as_bytes())
    }

    /// Hash a serializable value as JSON with domain separation.
    pub fn hash_json<T: serde::Serialize>(&self, value: &T) -> Result<Digest, HasherError> {
        let data =
            serde_json::to_vec(value).map_err(|e| HasherError::Serialization(e.to_string()))?;
        Ok(self.hash(&data))
    }

    /// Verify that data produces the expected digest.
    pub fn verify(&self, data: &[u8], expected: &Digest) -> bool {
        self.hash(data) == *expected
    }

    /// A BLAKE3 hasher already fed with this domain's prefix.
    pub fn start(&self) -> blake3::Hasher {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// Content hash of a document payload.
///
/// Deterministic over the canonical encoding; empty payloads are rejected
/// because they carry nothing to attest.
pub fn hash_payload(payload: &Payload) -> Result<Digest, HasherError> {
    if payload.is_empty() {
        return Err(HasherError::EmptyPayload);
    }
    let bytes = payload
        .canonical_bytes()
        .map_err(|e| HasherError::Serialization(e.to_string()))?;
    Ok(ContentHasher::DOCUMENT.hash(&bytes))
}

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("payload is empty")]
    EmptyPayload,

    #[error("serialization error: {0}")]
    Serialization(String),
}
