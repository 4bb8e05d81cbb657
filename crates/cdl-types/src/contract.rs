use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{ContractId, DocumentId};

/// Closed set of contract types. Each carries its own one-shot effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractType {
    DocumentIssuance,
    IdentityVerification,
    ServiceApproval,
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DocumentIssuance => "document_issuance",
            Self::IdentityVerification => "identity_verification",
            Self::ServiceApproval => "service_approval",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Active,
    Executed,
    Cancelled,
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Executed => "executed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// What a condition checks, with its kind-specific parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConditionKind {
    /// The referenced document passes verification.
    DocumentVerified { document_id: DocumentId },
    /// Payments recorded under `reference` total at least `amount` (minor units).
    PaymentReceived { reference: String, amount: u64 },
    /// `approver_id` has approved `reference`.
    ApprovalGiven {
        reference: String,
        approver_id: String,
    },
    /// The current time is at or past `not_before`.
    TimeElapsed { not_before: DateTime<Utc> },
}

impl ConditionKind {
    /// Stable name of the kind, matching its serde tag.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DocumentVerified { .. } => "document_verified",
            Self::PaymentReceived { .. } => "payment_received",
            Self::ApprovalGiven { .. } => "approval_given",
            Self::TimeElapsed { .. } => "time_elapsed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(flatten)]
    pub kind: ConditionKind,
    /// Result of the most recent evaluation.
    #[serde(default)]
    pub fulfilled: bool,
}

impl Condition {
    pub fn new(kind: ConditionKind) -> Self {
        Self {
            kind,
            fulfilled: false,
        }
    }
}

impl From<ConditionKind> for Condition {
    fn from(kind: ConditionKind) -> Self {
        Self::new(kind)
    }
}

/// Result of a contract's one-shot side effect.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub summary: String,
    /// Match confidence reported by the scorer, for identity checks.
    pub confidence: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SmartContract {
    pub id: ContractId,
    #[serde(rename = "type")]
    pub contract_type: ContractType,
    pub conditions: Vec<Condition>,
    pub status: ContractStatus,
    pub creator: String,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub execution: Option<ExecutionRecord>,
}

impl SmartContract {
    pub fn is_active(&self) -> bool {
        self.status == ContractStatus::Active
    }

    /// Returns `true` if every condition held at the last evaluation.
    pub fn all_fulfilled(&self) -> bool {
        self.conditions.iter().all(|c| c.fulfilled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn condition_serializes_with_kind_tag() {
        let id = DocumentId::new();
        let condition = Condition::new(ConditionKind::DocumentVerified { document_id: id });
        let value = serde_json::to_value(&condition).unwrap();
        assert_eq!(
            value,
            json!({"kind": "document_verified", "document_id": id.to_string(), "fulfilled": false})
        );
    }

    #[test]
    fn condition_deserializes_without_fulfilled() {
        let condition: Condition = serde_json::from_value(json!({
            "kind": "payment_received",
            "reference": "INV-7",
            "amount": 2500
        }))
        .unwrap();
        assert!(!condition.fulfilled);
        assert_eq!(condition.kind.name(), "payment_received");
    }

    #[test]
    fn contract_type_uses_snake_case() {
        let t: ContractType = serde_json::from_str("\"identity_verification\"").unwrap();
        assert_eq!(t, ContractType::IdentityVerification);
        assert_eq!(t.to_string(), "identity_verification");
    }

    #[test]
    fn empty_condition_list_is_fulfilled() {
        let contract = SmartContract {
            id: ContractId::new(),
            contract_type: ContractType::ServiceApproval,
            conditions: vec![],
            status: ContractStatus::Active,
            creator: "agency-1".into(),
            created_at: Utc::now(),
            executed_at: None,
            execution: None,
        };
        assert!(contract.all_fulfilled());
        assert!(contract.is_active());
    }
}
