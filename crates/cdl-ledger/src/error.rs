use cdl_types::{ContractId, ContractStatus, DocumentId, DocumentStatus};

/// Errors produced by ledger operations.
///
/// Verification never produces one of these: a document failing its checks
/// is reported through a graded `VerificationResult`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("document not found: {0}")]
    DocumentNotFound(DocumentId),

    #[error("a sealing pass is already in progress; retry later")]
    SealingInProgress,

    #[error("no nonce in 0..={attempts} meets difficulty {difficulty}")]
    MiningExhausted { attempts: u64, difficulty: u32 },

    #[error("chain advanced during sealing; expected to append index {expected_index}")]
    ChainConflict { expected_index: u64 },

    #[error("contract not found: {0}")]
    ContractNotFound(ContractId),

    #[error("contract {id} is already {status}")]
    ContractAlreadyResolved { id: ContractId, status: ContractStatus },

    #[error("invalid contract: {0}")]
    InvalidContract(String),

    #[error("cannot {action} document {id} while {from}")]
    InvalidTransition {
        id: DocumentId,
        from: DocumentStatus,
        action: &'static str,
    },

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("background task failed: {0}")]
    BackgroundTask(String),
}

impl LedgerError {
    /// Returns `true` if the caller should retry the same call later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SealingInProgress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_sealing_in_progress_is_retryable() {
        assert!(LedgerError::SealingInProgress.is_retryable());
        assert!(!LedgerError::DocumentNotFound(DocumentId::new()).is_retryable());
        assert!(!LedgerError::MiningExhausted {
            attempts: 10,
            difficulty: 6
        }
        .is_retryable());
    }

    #[test]
    fn transition_message_names_status() {
        let id = DocumentId::new();
        let err = LedgerError::InvalidTransition {
            id,
            from: DocumentStatus::Pending,
            action: "revoke",
        };
        assert_eq!(err.to_string(), format!("cannot revoke document {id} while pending"));
    }
}
