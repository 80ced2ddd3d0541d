use chrono::{DateTime, Utc};
use payroll_zk::{Amount, ProofToken, SealedValue};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One employee as the employer's registry holds it.
///
/// `salary` is plaintext and never leaves the employer side; employees only ever see `sealed_salary`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Employee {
    pub id: Uuid,
    pub name: String,
    pub role: String,
    pub wallet: String,
    pub salary: Amount,
    pub sealed_salary: SealedValue,
    pub proof: ProofToken,
    pub added_at: DateTime<Utc>,
    pub total_paid: Amount,
    pub payments_count: u64,
    pub last_paid_at: Option<DateTime<Utc>>,
}

/// One committed payroll run. Immutable once it exists.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PayrollBatch {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub employee_count: usize,
    pub total_amount: Amount,
    pub batch_proof: ProofToken,
    pub transactions: Vec<PayrollTransaction>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PayrollTransaction {
    pub employee_id: Uuid,
    pub employee_name: String,
    pub wallet: String,
    pub sealed_amount: SealedValue,
    pub proof: ProofToken,
    pub tx_ref: String,
}

/// An employee's payment ledger as one commit left it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    pub employee_id: Uuid,
    pub total_paid: Amount,
    pub payments_count: u64,
    pub last_paid_at: Option<DateTime<Utc>>,
}

/// A committed batch with the ledgers of every employee it paid.
#[derive(Clone, Debug)]
pub struct CommittedRun {
    pub batch: PayrollBatch,
    pub ledgers: Vec<Ledger>,
}

/// Lifecycle of the payroll processor. Holds the last terminal state while idle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Running,
    Committed,
    Aborted,
}

/// How much of a sealed amount a view discloses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "amount", rename_all = "snake_case")]
pub enum Disclosure {
    /// Reveal was not requested.
    Sealed,
    Revealed(Amount),
    /// Reveal was requested but this value could not be unsealed.
    Unavailable,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub batch_id: Uuid,
    pub paid_at: DateTime<Utc>,
    pub tx_ref: String,
    pub sealed_amount: SealedValue,
    pub proof: ProofToken,
    pub amount: Disclosure,
}

/// What an employee sees when presenting their wallet.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OwnView {
    pub wallet: String,
    pub name: String,
    pub role: String,
    pub sealed_salary: SealedValue,
    pub salary: Disclosure,
    pub total_paid: Amount,
    pub payments_count: u64,
    pub last_paid_at: Option<DateTime<Utc>>,
    /// Most recent batch first.
    pub history: Vec<PaymentRecord>,
}

#[derive(Clone, Debug)]
pub enum ViewOutcome {
    Found(Box<OwnView>),
    /// No employee holds this wallet. A valid answer, not an error.
    EmployeeNotFound,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollSummary {
    pub employee_count: usize,
    pub monthly_payroll: Amount,
    pub payroll_runs: usize,
    pub total_disbursed: Amount,
}

/// Third-party check of a batch using proofs only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchVerification {
    pub batch_id: Uuid,
    pub batch_proof_valid: bool,
    pub invalid_transactions: Vec<String>,
    pub valid: bool,
}

/// Registration input as the presentation layer submits it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewEmployee {
    pub name: String,
    pub role: String,
    pub wallet: String,
    /// Decimal string, e.g. "0.05".
    pub salary: String,
}

/// Employer edit. Absent fields are left unchanged.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EmployeeUpdate {
    pub name: Option<String>,
    pub role: Option<String>,
    pub salary: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OwnViewParams {
    pub reveal: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyProofRequest {
    pub token: ProofToken,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyProofResponse {
    pub ok: bool,
}
