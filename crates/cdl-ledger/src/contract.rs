use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use cdl_types::{
    Condition, ConditionKind, ContractId, ContractStatus, ContractType, ExecutionRecord,
    SmartContract,
};

use crate::effects::EffectHandler;
use crate::error::LedgerError;
use crate::traits::DocumentVerifier;

/// Stores contracts, evaluates their conditions, and fires their effects.
pub struct ContractEngine {
    contracts: RwLock<ContractTable>,
    signals: RwLock<Signals>,
    effects: Arc<dyn EffectHandler>,
}

#[derive(Default)]
struct ContractTable {
    by_id: HashMap<ContractId, SmartContract>,
    /// Creation order.
    order: Vec<ContractId>,
}

/// Ledger state read by payment and approval conditions.
#[derive(Default)]
struct Signals {
    payments: HashMap<String, u64>,
    approvals: HashSet<(String, String)>,
}

impl ContractEngine {
    pub fn new(effects: Arc<dyn EffectHandler>) -> Self {
        Self {
            contracts: RwLock::new(ContractTable::default()),
            signals: RwLock::new(Signals::default()),
            effects,
        }
    }

    pub fn create(
        &self,
        contract_type: ContractType,
        conditions: Vec<ConditionKind>,
        creator: &str,
        now: DateTime<Utc>,
    ) -> Result<SmartContract, LedgerError> {
        if creator.trim().is_empty() {
            return Err(LedgerError::InvalidContract("creator is empty".into()));
        }
        if conditions.is_empty() {
            return Err(LedgerError::InvalidContract("no conditions".into()));
        }
        for kind in &conditions {
            validate_condition(kind)?;
        }

        let contract = SmartContract {
            id: ContractId::new(),
            contract_type,
            conditions: conditions.into_iter().map(Condition::new).collect(),
            status: ContractStatus::Active,
            creator: creator.to_string(),
            created_at: now,
            executed_at: None,
            execution: None,
        };

        let mut table = self.write()?;
        table.order.push(contract.id);
        table.by_id.insert(contract.id, contract.clone());
        debug!(id = %contract.id, kind = %contract.contract_type, "contract created");
        Ok(contract)
    }

    pub fn get(&self, id: &ContractId) -> Result<Option<SmartContract>, LedgerError> {
        Ok(self.read()?.by_id.get(id).cloned())
    }

    /// All contracts in creation order.
    pub fn list(&self) -> Result<Vec<SmartContract>, LedgerError> {
        let table = self.read()?;
        Ok(table
            .order
            .iter()
            .filter_map(|id| table.by_id.get(id).cloned())
            .collect())
    }

    pub fn count_with_status(&self, status: ContractStatus) -> Result<usize, LedgerError> {
        Ok(self
            .read()?
            .by_id
            .values()
            .filter(|c| c.status == status)
            .count())
    }

    /// Recompute every condition and store the results.
    ///
    /// Never changes the contract's status.
    pub fn evaluate(
        &self,
        id: &ContractId,
        verifier: &dyn DocumentVerifier,
        now: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        let conditions = self
            .get(id)?
            .ok_or(LedgerError::ContractNotFound(*id))?
            .conditions;

        // Condition checks may verify documents; run them without holding
        // the contract table.
        let fulfilled: Vec<bool> = {
            let signals = self
                .signals
                .read()
                .map_err(|_| LedgerError::LockPoisoned("contract signals"))?;
            conditions
                .iter()
                .map(|c| holds(&c.kind, verifier, &signals, now))
                .collect()
        };

        let mut table = self.write()?;
        let contract = table
            .by_id
            .get_mut(id)
            .ok_or(LedgerError::ContractNotFound(*id))?;
        for (condition, result) in contract.conditions.iter_mut().zip(&fulfilled) {
            condition.fulfilled = *result;
        }
        Ok(fulfilled.iter().all(|f| *f))
    }

    /// Evaluate, then execute once if every condition holds.
    ///
    /// Returns `Ok(false)` for unsatisfied or already resolved contracts.
    pub fn try_execute(
        &self,
        id: &ContractId,
        verifier: &dyn DocumentVerifier,
        now: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        let current = self.get(id)?.ok_or(LedgerError::ContractNotFound(*id))?;
        if !current.is_active() || !self.evaluate(id, verifier, now)? {
            return Ok(false);
        }

        let executed = {
            let mut table = self.write()?;
            let contract = table
                .by_id
                .get_mut(id)
                .ok_or(LedgerError::ContractNotFound(*id))?;
            if !contract.is_active() {
                return Ok(false);
            }
            contract.status = ContractStatus::Executed;
            contract.executed_at = Some(now);
            contract.clone()
        };

        let record = self.effects.dispatch(&executed);
        info!(id = %id, kind = %executed.contract_type, summary = %record.summary, "contract executed");
        self.store_execution(id, record)?;
        Ok(true)
    }

    /// Cancel an active contract.
    pub fn cancel(&self, id: &ContractId) -> Result<SmartContract, LedgerError> {
        let mut table = self.write()?;
        let contract = table
            .by_id
            .get_mut(id)
            .ok_or(LedgerError::ContractNotFound(*id))?;
        if !contract.is_active() {
            return Err(LedgerError::ContractAlreadyResolved {
                id: *id,
                status: contract.status,
            });
        }
        contract.status = ContractStatus::Cancelled;
        Ok(contract.clone())
    }

    /// Add to the amount received under `reference`. Returns the new total.
    pub fn record_payment(&self, reference: &str, amount: u64) -> Result<u64, LedgerError> {
        if reference.trim().is_empty() {
            return Err(LedgerError::InvalidPayload("payment reference is empty".into()));
        }
        let mut signals = self
            .signals
            .write()
            .map_err(|_| LedgerError::LockPoisoned("contract signals"))?;
        let total = signals.payments.entry(reference.to_string()).or_default();
        *total = total.saturating_add(amount);
        Ok(*total)
    }

    pub fn record_approval(&self, reference: &str, approver_id: &str) -> Result<(), LedgerError> {
        if reference.trim().is_empty() || approver_id.trim().is_empty() {
            return Err(LedgerError::InvalidPayload(
                "approval reference and approver are required".into(),
            ));
        }
        self.signals
            .write()
            .map_err(|_| LedgerError::LockPoisoned("contract signals"))?
            .approvals
            .insert((reference.to_string(), approver_id.to_string()));
        Ok(())
    }

    fn store_execution(&self, id: &ContractId, record: ExecutionRecord) -> Result<(), LedgerError> {
        if let Some(contract) = self.write()?.by_id.get_mut(id) {
            contract.execution = Some(record);
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, ContractTable>, LedgerError> {
        self.contracts
            .read()
            .map_err(|_| LedgerError::LockPoisoned("contracts"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, ContractTable>, LedgerError> {
        self.contracts
            .write()
            .map_err(|_| LedgerError::LockPoisoned("contracts"))
    }
}

fn validate_condition(kind: &ConditionKind) -> Result<(), LedgerError> {
    match kind {
        ConditionKind::PaymentReceived { reference, amount } => {
            if reference.trim().is_empty() || *amount == 0 {
                return Err(LedgerError::InvalidContract(
                    "payment_received needs a reference and a positive amount".into(),
                ));
            }
        }
        ConditionKind::ApprovalGiven {
            reference,
            approver_id,
        } => {
            if reference.trim().is_empty() || approver_id.trim().is_empty() {
                return Err(LedgerError::InvalidContract(
                    "approval_given needs a reference and an approver".into(),
                ));
            }
        }
        ConditionKind::DocumentVerified { .. } | ConditionKind::TimeElapsed { .. } => {}
    }
    Ok(())
}

fn holds(
    kind: &ConditionKind,
    verifier: &dyn DocumentVerifier,
    signals: &Signals,
    now: DateTime<Utc>,
) -> bool {
    match kind {
        ConditionKind::DocumentVerified { document_id } => {
            verifier.verify_document(document_id).is_valid
        }
        ConditionKind::PaymentReceived { reference, amount } => {
            signals.payments.get(reference).copied().unwrap_or(0) >= *amount
        }
        ConditionKind::ApprovalGiven {
            reference,
            approver_id,
        } => signals
            .approvals
            .contains(&(reference.clone(), approver_id.clone())),
        ConditionKind::TimeElapsed { not_before } => now >= *not_before,
    }
}
