//! Payroll runs: snapshot, seal, attest, settle, commit.
//!
//! ```text
//! Idle --begin_run--> Running --execute--> Committed
//!                        |
//!                        +--(no employees | provider failure | overflow | dropped)--> Aborted
//! ```
//!
//! At most one run is in flight. Commit appends the batch and credits every ledger under both
//! write locks, so readers see either all of a run or none of it.

use crate::binding::{batch_context, transaction_context};
use crate::errors::PayrollError;
use crate::models::{CommittedRun, Employee, PayrollBatch, PayrollTransaction, RunPhase};
use crate::payroll::Payroll;
use crate::query::verify_batch;
use chrono::Utc;
use payroll_zk::{Amount, ConfidentialityProvider, ProofToken, ProviderError, Statement};
use rand::RngCore;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Owns payroll history and the single run slot.
pub struct BatchProcessor {
    pub(crate) history: RwLock<VecDeque<PayrollBatch>>,
    phase: Mutex<RunPhase>,
    settlement_delay: Duration,
}

impl BatchProcessor {
    /// `history` must already be ordered most recent first.
    pub fn new(history: Vec<PayrollBatch>, settlement_delay: Duration) -> Self {
        Self {
            history: RwLock::new(history.into()),
            phase: Mutex::new(RunPhase::Idle),
            settlement_delay,
        }
    }

    pub fn phase(&self) -> RunPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_phase(&self, phase: RunPhase) {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
    }

    /// Claim the run slot, rejecting rather than queueing when it is taken.
    fn claim(&self) -> Result<(), PayrollError> {
        let mut phase = self.phase.lock().unwrap_or_else(|e| e.into_inner());
        if *phase == RunPhase::Running {
            return Err(PayrollError::ConcurrentRunRejected);
        }
        *phase = RunPhase::Running;
        Ok(())
    }
}

/// Everything a run computes before it commits.
#[derive(Debug)]
pub struct PreparedBatch {
    pub id: Uuid,
    pub total_amount: Amount,
    pub batch_proof: ProofToken,
    pub transactions: Vec<PayrollTransaction>,
    pub payments: Vec<(Uuid, Amount)>,
}

fn new_tx_ref() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("0x{}", hex::encode(bytes))
}

/// Seal and attest every snapshot entry, in snapshot order.
///
/// Salaries are sealed again here rather than reusing the registration seal, so no two batches
/// share a sealed value.
pub fn prepare_batch(provider: &dyn ConfidentialityProvider, snapshot: &[Employee]) -> Result<PreparedBatch, PayrollError> {
    let amounts: Vec<Amount> = snapshot.iter().map(|e| e.salary).collect();
    let total_amount = Amount::checked_sum(amounts.iter().copied()).ok_or(PayrollError::AmountOverflow)?;
    let id = Uuid::new_v4();

    let mut refs = HashSet::with_capacity(snapshot.len());
    let mut transactions = Vec::with_capacity(snapshot.len());
    for employee in snapshot {
        let tx_ref = loop {
            let candidate = new_tx_ref();
            if refs.insert(candidate.clone()) {
                break candidate;
            }
        };
        let sealed_amount = provider.seal(employee.salary, &employee.wallet)?;
        let context = transaction_context(id, &tx_ref, &employee.wallet, &sealed_amount);
        let proof = provider.attest(Statement::Salary { amount: employee.salary, context: &context })?;
        transactions.push(PayrollTransaction {
            employee_id: employee.id,
            employee_name: employee.name.clone(),
            wallet: employee.wallet.clone(),
            sealed_amount,
            proof,
            tx_ref,
        });
    }

    let context = batch_context(id, &transactions);
    let batch_proof = provider.attest(Statement::Batch { amounts: &amounts, context: &context })?;

    Ok(PreparedBatch {
        id,
        total_amount,
        batch_proof,
        transactions,
        payments: snapshot.iter().map(|e| (e.id, e.salary)).collect(),
    })
}

/// An in-flight payroll run holding the run slot and its registry snapshot.
///
/// Dropping a run that has not finished aborts it.
pub struct PayrollRun {
    payroll: Payroll,
    snapshot: Vec<Employee>,
    finished: bool,
}

impl PayrollRun {
    /// Claim the run slot and snapshot the registry.
    pub(crate) async fn begin(payroll: Payroll) -> Result<Self, PayrollError> {
        payroll.processor().claim()?;
        // The guard exists before the first await so cancellation still releases the slot.
        let mut run = Self { payroll, snapshot: Vec::new(), finished: false };
        run.snapshot = run.payroll.registry().read().await.snapshot();

        if run.snapshot.is_empty() {
            return Err(run.abort(PayrollError::NoEmployees));
        }
        info!(employees = run.snapshot.len(), "payroll run started");
        Ok(run)
    }

    pub fn snapshot(&self) -> &[Employee] {
        &self.snapshot
    }

    /// Seal, attest, settle and commit. Any failure aborts with nothing persisted.
    pub async fn execute(self) -> Result<PayrollBatch, PayrollError> {
        self.execute_with_ledgers().await.map(|run| run.batch)
    }

    /// Same as [`execute`](Self::execute), also returning the ledgers exactly as this commit left them.
    pub async fn execute_with_ledgers(mut self) -> Result<CommittedRun, PayrollError> {
        match self.commit().await {
            Ok(run) => {
                self.finished = true;
                self.payroll.processor().set_phase(RunPhase::Committed);
                info!(
                    batch_id = %run.batch.id,
                    employees = run.batch.employee_count,
                    total = %run.batch.total_amount,
                    "payroll batch committed"
                );
                Ok(run)
            }
            Err(e) => Err(self.abort(e)),
        }
    }

    async fn commit(&mut self) -> Result<CommittedRun, PayrollError> {
        let provider = self.payroll.provider().clone();
        let snapshot = self.snapshot.clone();
        let prepared = tokio::task::spawn_blocking(move || prepare_batch(provider.as_ref(), &snapshot))
            .await
            .map_err(|e| ProviderError::Failure(format!("sealing task failed: {e}")))??;

        // Stand-in for settlement latency; the run may be suspended here.
        let delay = self.payroll.processor().settlement_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut registry = self.payroll.registry().write().await;
        let mut history = self.payroll.processor().history.write().await;

        let batch = PayrollBatch {
            id: prepared.id,
            created_at: Utc::now(),
            employee_count: prepared.transactions.len(),
            total_amount: prepared.total_amount,
            batch_proof: prepared.batch_proof,
            transactions: prepared.transactions,
        };

        // Ledgers first: it is the only step that can still fail, and it fails without mutating.
        let ledgers = registry.apply_payments(&prepared.payments, batch.created_at)?;
        history.push_front(batch.clone());
        Ok(CommittedRun { batch, ledgers })
    }

    fn abort(mut self, error: PayrollError) -> PayrollError {
        self.finished = true;
        self.payroll.processor().set_phase(RunPhase::Aborted);
        warn!(error = %error, retryable = error.is_retryable(), "payroll run aborted");
        error
    }
}

impl Drop for PayrollRun {
    fn drop(&mut self) {
        if !self.finished {
            self.payroll.processor().set_phase(RunPhase::Aborted);
            warn!("payroll run dropped before completion");
        }
    }
}

/// Employer-side audit: unseal every transaction and check the batch invariants.
pub fn audit(provider: &dyn ConfidentialityProvider, batch: &PayrollBatch) -> Result<(), String> {
    if batch.employee_count != batch.transactions.len() {
        return Err(format!(
            "employee_count {} does not match {} transactions",
            batch.employee_count,
            batch.transactions.len()
        ));
    }

    let mut amounts = Vec::with_capacity(batch.transactions.len());
    for tx in &batch.transactions {
        let amount = provider
            .unseal(&tx.sealed_amount, &tx.wallet)
            .map_err(|e| format!("transaction {}: {e}", tx.tx_ref))?;
        amounts.push(amount);
    }

    let sum = Amount::checked_sum(amounts).ok_or("transaction amounts overflow")?;
    if sum != batch.total_amount {
        return Err(format!("total {} does not match transaction sum {sum}", batch.total_amount));
    }
    if !verify_batch(provider, batch).valid {
        return Err("batch proofs do not match the batch record".to_string());
    }
    Ok(())
}
