//! One-shot contract side effects.

use std::sync::Arc;

use cdl_types::{ContractType, ExecutionRecord, SmartContract};

/// Scores how well an identity claim matches, in `0.0..=1.0`.
pub trait ConfidenceScorer: Send + Sync {
    fn score(&self, contract: &SmartContract) -> f64;
}

/// Always reports the same confidence.
#[derive(Clone, Copy, Debug)]
pub struct FixedScorer(pub f64);

impl Default for FixedScorer {
    fn default() -> Self {
        Self(1.0)
    }
}

impl ConfidenceScorer for FixedScorer {
    fn score(&self, _contract: &SmartContract) -> f64 {
        self.0.clamp(0.0, 1.0)
    }
}

/// Runs the side effect bound to a contract's type.
///
/// Called at most once per contract, after it has moved to `executed`.
pub trait EffectHandler: Send + Sync {
    fn dispatch(&self, contract: &SmartContract) -> ExecutionRecord;
}

/// Default effects: a summary per contract type, with identity checks scored.
#[derive(Clone)]
pub struct StandardEffects {
    scorer: Arc<dyn ConfidenceScorer>,
}

impl StandardEffects {
    pub fn new(scorer: Arc<dyn ConfidenceScorer>) -> Self {
        Self { scorer }
    }
}

impl Default for StandardEffects {
    fn default() -> Self {
        Self::new(Arc::new(FixedScorer::default()))
    }
}

impl EffectHandler for StandardEffects {
    fn dispatch(&self, contract: &SmartContract) -> ExecutionRecord {
        match contract.contract_type {
            ContractType::DocumentIssuance => ExecutionRecord {
                summary: format!(
                    "document issuance released for {} ({} conditions met)",
                    contract.creator,
                    contract.conditions.len()
                ),
                confidence: None,
            },
            ContractType::IdentityVerification => {
                let confidence = self.scorer.score(contract);
                ExecutionRecord {
                    summary: format!("identity verified with confidence {confidence:.2}"),
                    confidence: Some(confidence),
                }
            }
            ContractType::ServiceApproval => ExecutionRecord {
                summary: format!("service approval granted to {}", contract.creator),
                confidence: None,
            },
        }
    }
}
