//! Cryptographic primitives for the Civic Document Ledger.
//!
//! Provides domain-separated BLAKE3 hashing, binary Merkle trees with
//! inclusion proofs, the document signing seam, proof-of-work block hashing,
//! and block chain verification.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography here.

pub mod chain;
pub mod hasher;
pub mod merkle;
pub mod pow;
pub mod signer;

pub use chain::{ChainError, ChainVerifier};
pub use hasher::{hash_payload, ContentHasher, HasherError};
pub use merkle::{merkle_root, MerkleProof, MerkleTree, Side};
pub use pow::{compute_block_hash, meets_difficulty, BlockHasher};
pub use signer::{
    DocumentSigner, Ed25519Keyring, KeyedDigestSigner, SignatureError, SigningKey, VerifyingKey,
};
