//! Read-only projections over the registry and payroll history.

use crate::binding::{batch_context, transaction_context};
use crate::errors::PayrollError;
use crate::models::{BatchVerification, Disclosure, OwnView, PaymentRecord, PayrollBatch, PayrollSummary, ViewOutcome};
use crate::registry::EmployeeRegistry;
use payroll_zk::{Amount, ConfidentialityProvider, SealedValue};
use std::collections::VecDeque;

fn disclose(provider: &dyn ConfidentialityProvider, sealed: &SealedValue, wallet: &str, reveal: bool) -> Disclosure {
    if !reveal {
        return Disclosure::Sealed;
    }
    match provider.unseal(sealed, wallet) {
        Ok(amount) => Disclosure::Revealed(amount),
        Err(e) => {
            tracing::debug!(error = %e, "sealed amount unavailable");
            Disclosure::Unavailable
        }
    }
}

/// An employee's own salary and payment history, looked up by wallet.
///
/// With `reveal`, each sealed amount is opened for the wallet; an entry that fails to open is
/// marked unavailable and the rest of the view is unaffected.
pub fn own_view(
    provider: &dyn ConfidentialityProvider,
    registry: &EmployeeRegistry,
    history: &VecDeque<PayrollBatch>,
    wallet: &str,
    reveal: bool,
) -> ViewOutcome {
    let Some(employee) = registry.find_by_wallet(wallet) else {
        return ViewOutcome::EmployeeNotFound;
    };

    let history = history
        .iter()
        .flat_map(|batch| {
            batch
                .transactions
                .iter()
                .filter(|tx| tx.wallet == employee.wallet)
                .map(move |tx| (batch, tx))
        })
        .map(|(batch, tx)| PaymentRecord {
            batch_id: batch.id,
            paid_at: batch.created_at,
            tx_ref: tx.tx_ref.clone(),
            sealed_amount: tx.sealed_amount.clone(),
            proof: tx.proof.clone(),
            amount: disclose(provider, &tx.sealed_amount, &employee.wallet, reveal),
        })
        .collect();

    ViewOutcome::Found(Box::new(OwnView {
        wallet: employee.wallet.clone(),
        name: employee.name.clone(),
        role: employee.role.clone(),
        sealed_salary: employee.sealed_salary.clone(),
        salary: disclose(provider, &employee.sealed_salary, &employee.wallet, reveal),
        total_paid: employee.total_paid,
        payments_count: employee.payments_count,
        last_paid_at: employee.last_paid_at,
        history,
    }))
}

/// Employer dashboard figures.
pub fn summary(registry: &EmployeeRegistry, history: &VecDeque<PayrollBatch>) -> Result<PayrollSummary, PayrollError> {
    let monthly_payroll = Amount::checked_sum(registry.list_all().iter().map(|e| e.salary))
        .ok_or(PayrollError::AmountOverflow)?;
    let total_disbursed = Amount::checked_sum(history.iter().map(|b| b.total_amount))
        .ok_or(PayrollError::AmountOverflow)?;

    Ok(PayrollSummary {
        employee_count: registry.len(),
        monthly_payroll,
        payroll_runs: history.len(),
        total_disbursed,
    })
}

/// Check a batch using only its proofs. Nothing is unsealed.
///
/// The batch proof must verify, disclose exactly the recorded total, be sized for the recorded
/// transactions and be bound to this batch id and transaction list. Each transaction proof must be a
/// salary proof bound to that transaction.
pub fn verify_batch(provider: &dyn ConfidentialityProvider, batch: &PayrollBatch) -> BatchVerification {
    let context = batch_context(batch.id, &batch.transactions);
    let batch_proof_valid = provider.check(&batch.batch_proof).is_some_and(|attestation| {
        attestation.total == Some(batch.total_amount)
            && attestation.covers_batch_of(batch.transactions.len())
            && attestation.is_bound_to(&context)
    });

    let invalid_transactions: Vec<String> = batch
        .transactions
        .iter()
        .filter(|tx| {
            let context = transaction_context(batch.id, &tx.tx_ref, &tx.wallet, &tx.sealed_amount);
            !provider
                .check(&tx.proof)
                .is_some_and(|attestation| attestation.total.is_none() && attestation.is_bound_to(&context))
        })
        .map(|tx| tx.tx_ref.clone())
        .collect();
    let counts_match = batch.employee_count == batch.transactions.len();

    BatchVerification {
        batch_id: batch.id,
        batch_proof_valid,
        valid: batch_proof_valid && counts_match && invalid_transactions.is_empty(),
        invalid_transactions,
    }
}
