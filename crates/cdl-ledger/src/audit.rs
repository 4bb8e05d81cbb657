//! Audit sink boundary.
//!
//! The ledger reports every registration, seal, verification, and contract
//! execution to an [`AuditSink`]. Recording is fire-and-forget: a failing
//! sink is logged and otherwise ignored, and never fails the operation that
//! produced the event.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Register,
    Countersign,
    Revoke,
    Seal,
    Verify,
    ContractCreated,
    Execute,
    Cancel,
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Register => "register",
            Self::Countersign => "countersign",
            Self::Revoke => "revoke",
            Self::Seal => "seal",
            Self::Verify => "verify",
            Self::ContractCreated => "contract_created",
            Self::Execute => "execute",
            Self::Cancel => "cancel",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

/// A structured audit record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub severity: Severity,
    pub outcome: Outcome,
    pub details: BTreeMap<String, String>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEvent {
    /// A successful, informational event.
    pub fn new(event_type: AuditEventType, recorded_at: DateTime<Utc>) -> Self {
        Self {
            event_type,
            severity: Severity::Info,
            outcome: Outcome::Success,
            details: BTreeMap::new(),
            recorded_at,
        }
    }

    pub fn failed(mut self, severity: Severity) -> Self {
        self.outcome = Outcome::Failure;
        self.severity = severity;
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.details.insert(key.into(), value.to_string());
        self
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError>;
}

/// Emits each event as a `tracing` event on target `cdl::audit`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        let details = format!("{:?}", event.details);
        match event.severity {
            Severity::Info => tracing::info!(
                target: "cdl::audit",
                event = %event.event_type,
                outcome = ?event.outcome,
                %details,
                "audit"
            ),
            Severity::Warning => tracing::warn!(
                target: "cdl::audit",
                event = %event.event_type,
                outcome = ?event.outcome,
                %details,
                "audit"
            ),
            Severity::Critical => tracing::error!(
                target: "cdl::audit",
                event = %event.event_type,
                outcome = ?event.outcome,
                %details,
                "audit"
            ),
        }
        Ok(())
    }
}

/// Keeps events in memory, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self, event_type: AuditEventType) -> usize {
        self.events
            .lock()
            .map(|events| events.iter().filter(|e| e.event_type == event_type).count())
            .unwrap_or(0)
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.events
            .lock()
            .map_err(|_| AuditError::Unavailable("memory sink lock poisoned".into()))?
            .push(event);
        Ok(())
    }
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _event: AuditEvent) -> Result<(), AuditError> {
        Ok(())
    }
}
