use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::DocumentId;

/// Graded trust classification derived from the number of passing checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationLevel {
    Invalid,
    Low,
    Medium,
    High,
}

impl VerificationLevel {
    /// 5 → high, 3–4 → medium, 1–2 → low, 0 → invalid.
    pub fn from_passed(passed: u8) -> Self {
        match passed {
            5.. => Self::High,
            3 | 4 => Self::Medium,
            1 | 2 => Self::Low,
            0 => Self::Invalid,
        }
    }
}

impl fmt::Display for VerificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Invalid => "invalid",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        f.write_str(s)
    }
}

/// The five independent checks run against a document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationChecks {
    pub hash_match: bool,
    pub signature_valid: bool,
    pub chain_integrity: bool,
    pub not_revoked: bool,
    pub not_expired: bool,
}

impl VerificationChecks {
    /// All checks false: the result for an unknown document.
    pub const fn none() -> Self {
        Self {
            hash_match: false,
            signature_valid: false,
            chain_integrity: false,
            not_revoked: false,
            not_expired: false,
        }
    }

    pub fn passed(&self) -> u8 {
        [
            self.hash_match,
            self.signature_valid,
            self.chain_integrity,
            self.not_revoked,
            self.not_expired,
        ]
        .iter()
        .filter(|check| **check)
        .count() as u8
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub document_id: DocumentId,
    pub checks: VerificationChecks,
    pub passed: u8,
    pub level: VerificationLevel,
    pub is_valid: bool,
    /// Whether the document was found sealed in the chain.
    pub sealed: bool,
    pub block_index: Option<u64>,
    pub verified_at: DateTime<Utc>,
}

impl VerificationResult {
    /// Grade a set of checks. Unsealed documents are never valid and always
    /// grade `invalid`, whatever their individual checks say.
    pub fn grade(
        document_id: DocumentId,
        checks: VerificationChecks,
        sealed: bool,
        block_index: Option<u64>,
        verified_at: DateTime<Utc>,
    ) -> Self {
        let passed = checks.passed();
        let (level, is_valid) = if sealed {
            (VerificationLevel::from_passed(passed), passed >= 3)
        } else {
            (VerificationLevel::Invalid, false)
        };
        Self {
            document_id,
            checks,
            passed,
            level,
            is_valid,
            sealed,
            block_index,
            verified_at,
        }
    }

    /// Result for a document the ledger has never seen.
    pub fn not_found(document_id: DocumentId, verified_at: DateTime<Utc>) -> Self {
        Self::grade(document_id, VerificationChecks::none(), false, None, verified_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_true() -> VerificationChecks {
        VerificationChecks {
            hash_match: true,
            signature_valid: true,
            chain_integrity: true,
            not_revoked: true,
            not_expired: true,
        }
    }

    #[test]
    fn level_mapping() {
        assert_eq!(VerificationLevel::from_passed(5), VerificationLevel::High);
        assert_eq!(VerificationLevel::from_passed(4), VerificationLevel::Medium);
        assert_eq!(VerificationLevel::from_passed(3), VerificationLevel::Medium);
        assert_eq!(VerificationLevel::from_passed(2), VerificationLevel::Low);
        assert_eq!(VerificationLevel::from_passed(1), VerificationLevel::Low);
        assert_eq!(VerificationLevel::from_passed(0), VerificationLevel::Invalid);
    }

    #[test]
    fn sealed_document_grading() {
        let mut checks = all_true();
        let result = VerificationResult::grade(DocumentId::new(), checks, true, Some(1), Utc::now());
        assert_eq!(result.level, VerificationLevel::High);
        assert!(result.is_valid);

        checks.not_revoked = false;
        checks.hash_match = false;
        let result = VerificationResult::grade(DocumentId::new(), checks, true, Some(1), Utc::now());
        assert_eq!(result.passed, 3);
        assert_eq!(result.level, VerificationLevel::Medium);
        assert!(result.is_valid);

        checks.signature_valid = false;
        let result = VerificationResult::grade(DocumentId::new(), checks, true, Some(1), Utc::now());
        assert_eq!(result.level, VerificationLevel::Low);
        assert!(!result.is_valid);
    }

    #[test]
    fn unsealed_document_is_invalid() {
        let result = VerificationResult::grade(DocumentId::new(), all_true(), false, None, Utc::now());
        assert_eq!(result.passed, 5);
        assert_eq!(result.level, VerificationLevel::Invalid);
        assert!(!result.is_valid);
    }

    #[test]
    fn not_found_has_no_passing_checks() {
        let result = VerificationResult::not_found(DocumentId::new(), Utc::now());
        assert_eq!(result.checks, VerificationChecks::none());
        assert_eq!(result.level, VerificationLevel::Invalid);
        assert!(!result.sealed);
    }
}
