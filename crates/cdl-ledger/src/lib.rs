//! Core ledger for the Civic Document Ledger (CDL).
//!
//! This crate provides:
//! - `Registry`: document registration, lookup, amendment, and revocation
//! - `Sealer`: proof-of-work batching of pending documents into blocks
//! - `Chain`: the append-only block chain and its integrity walk
//! - Graded document verification behind the `DocumentVerifier` boundary
//! - `ContractEngine`: condition evaluation and one-shot effects
//! - `Ledger`: the thread-safe facade composing all of the above
//! - `SealScheduler`: periodic sealing on a tokio interval

pub mod audit;
pub mod chain;
pub mod clock;
pub mod config;
pub mod contract;
pub mod effects;
pub mod error;
pub mod ledger;
pub mod registry;
pub mod scheduler;
pub mod sealer;
pub mod traits;
mod verify;

pub use audit::{
    AuditError, AuditEvent, AuditEventType, AuditSink, MemoryAuditSink, NullAuditSink, Outcome,
    Severity, TracingAuditSink,
};
pub use chain::{Chain, IntegrityFailure, IntegrityReport};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::LedgerConfig;
pub use contract::ContractEngine;
pub use effects::{ConfidenceScorer, EffectHandler, FixedScorer, StandardEffects};
pub use error::LedgerError;
pub use ledger::{Ledger, LedgerBuilder, LedgerStats};
pub use registry::{NewDocument, Registry};
pub use scheduler::SealScheduler;
pub use sealer::Sealer;
pub use traits::DocumentVerifier;
