use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::document::Document;
use crate::id::DocumentId;

/// A sealed batch of documents in the hash chain.
///
/// `documents` holds each document exactly as it was when sealed (status
/// `pending`, no sealing hash). Later status changes live in the registry
/// and never touch the block, so the block hash stays stable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub previous_hash: Digest,
    pub hash: Digest,
    pub nonce: u64,
    pub merkle_root: Digest,
    pub documents: Vec<Document>,
}

impl Block {
    /// Returns `true` for the chain's first block.
    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    /// The sealed snapshot of a document, if this block contains it.
    pub fn document(&self, id: &DocumentId) -> Option<&Document> {
        self.documents.iter().find(|doc| doc.id == *id)
    }

    /// Position of a document within the block (its Merkle leaf index).
    pub fn position_of(&self, id: &DocumentId) -> Option<usize> {
        self.documents.iter().position(|doc| doc.id == *id)
    }

    /// Content hashes in block order: the Merkle leaves.
    pub fn content_hashes(&self) -> Vec<Digest> {
        self.documents.iter().map(|doc| doc.content_hash).collect()
    }
}

impl AsRef<Block> for Block {
    fn as_ref(&self) -> &Block {
        self
    }
}
