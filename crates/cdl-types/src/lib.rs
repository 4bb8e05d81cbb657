//! Foundation types for the Civic Document Ledger (CDL).
//!
//! Every other CDL crate depends on `cdl-types`. The types here are plain
//! data: hashing, signing, and sealing live in `cdl-crypto` and `cdl-ledger`.
//!
//! # Key Types
//!
//! - [`Digest`]: 32-byte BLAKE3 digest, hex-encoded on the wire
//! - [`DocumentId`] / [`ContractId`]: UUID v7 identifiers
//! - [`Document`]: a registered government document and its signatures
//! - [`Block`]: a sealed batch of documents in the hash chain
//! - [`SmartContract`]: declarative conditions gating a one-shot effect
//! - [`VerificationResult`]: graded outcome of the five document checks

pub mod block;
pub mod contract;
pub mod digest;
pub mod document;
pub mod error;
pub mod id;
pub mod verification;

pub use block::Block;
pub use contract::{
    Condition, ConditionKind, ContractStatus, ContractType, ExecutionRecord, SmartContract,
};
pub use digest::Digest;
pub use document::{Document, DocumentSignature, DocumentStatus, Payload, SignatureValue};
pub use error::TypeError;
pub use id::{ContractId, DocumentId};
pub use verification::{VerificationChecks, VerificationLevel, VerificationResult};
