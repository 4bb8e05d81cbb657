use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::digest::Digest;
use crate::error::TypeError;
use crate::id::DocumentId;

/// Lifecycle status of a document.
///
/// `Expired` is never stored: it is derived from `expires_at` by
/// [`Document::effective_status`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Verified,
    Revoked,
    Expired,
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// Canonical document payload.
///
/// Wraps a JSON value. `serde_json` keeps object keys sorted, so the compact
/// encoding returned by [`Payload::canonical_bytes`] is canonical.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(serde_json::Value);

impl Payload {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Returns `true` for `null`, blank strings, and empty arrays or objects.
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            serde_json::Value::Null => true,
            serde_json::Value::String(s) => s.trim().is_empty(),
            serde_json::Value::Array(items) => items.is_empty(),
            serde_json::Value::Object(map) => map.is_empty(),
            serde_json::Value::Bool(_) | serde_json::Value::Number(_) => false,
        }
    }

    /// Compact JSON encoding used for content hashing.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, TypeError> {
        serde_json::to_vec(&self.0).map_err(|e| TypeError::Serialization(e.to_string()))
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self(serde_json::Value::String(value.to_string()))
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self(serde_json::Value::String(value))
    }
}

/// Raw signature bytes, hex-encoded on the wire.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SignatureValue(Vec<u8>);

impl SignatureValue {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Debug for SignatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = &self.0[..self.0.len().min(8)];
        write!(f, "SignatureValue({}...)", hex::encode(head))
    }
}

impl Serialize for SignatureValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SignatureValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map(Self).map_err(serde::de::Error::custom)
    }
}

/// A signature attached to a document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSignature {
    pub signer_id: String,
    pub signer_role: String,
    pub signature_value: SignatureValue,
    pub signed_at: DateTime<Utc>,
    /// Scheme tag of the signer that produced the value (e.g. `"blake3-keyed"`).
    pub algorithm: String,
}

/// A registered government document.
///
/// `content_hash` is computed once at registration over the canonical
/// payload and never recomputed in place. `sealing_block_hash` is written
/// only by the sealer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub document_type: String,
    pub subject_id: String,
    pub payload: Payload,
    pub content_hash: Digest,
    pub sealing_block_hash: Option<Digest>,
    pub issued_at: DateTime<Utc>,
    pub status: DocumentStatus,
    pub signatures: Vec<DocumentSignature>,
    pub version: u32,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Document {
    /// Returns `true` once the document has been sealed into a block.
    pub fn is_sealed(&self) -> bool {
        self.sealing_block_hash.is_some()
    }

    /// Returns `true` if `expires_at` is set and `now` is at or past it.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| now >= expiry)
    }

    /// Status as observed at `now`, with expiry derived rather than stored.
    ///
    /// Revocation takes precedence over expiry.
    pub fn effective_status(&self, now: DateTime<Utc>) -> DocumentStatus {
        match self.status {
            DocumentStatus::Revoked => DocumentStatus::Revoked,
            _ if self.is_expired_at(now) => DocumentStatus::Expired,
            status => status,
        }
    }
}
