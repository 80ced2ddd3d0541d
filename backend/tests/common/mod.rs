#![allow(dead_code)]

use payroll_backend::models::{Employee, NewEmployee};
use payroll_backend::Payroll;
use payroll_zk::groth16::KeyStore;
use payroll_zk::{Amount, Attestation, ConfidentialityProvider, ProofToken, ProviderError, SealedValue, Statement, ZkProvider};
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

/// Shared per test binary so Groth16 setup runs once per circuit shape.
pub fn zk_provider() -> Arc<ZkProvider> {
    static PROVIDER: OnceLock<Arc<ZkProvider>> = OnceLock::new();
    PROVIDER
        .get_or_init(|| Arc::new(ZkProvider::new([9u8; 32], KeyStore::in_memory())))
        .clone()
}

pub fn payroll() -> Payroll {
    Payroll::new(zk_provider(), Duration::ZERO)
}

pub fn new_employee(wallet: &str, salary: &str) -> NewEmployee {
    NewEmployee {
        name: format!("Employee {wallet}"),
        role: "Engineer".to_string(),
        wallet: wallet.to_string(),
        salary: salary.to_string(),
    }
}

pub async fn register(payroll: &Payroll, wallet: &str, salary: &str) -> Employee {
    payroll.register(new_employee(wallet, salary)).await.unwrap()
}

pub fn amt(s: &str) -> Amount {
    s.parse().unwrap()
}

/// Wraps the real provider and fails on demand.
pub struct FlakyProvider {
    inner: Arc<ZkProvider>,
    /// Seals left before sealing starts failing; negative disables the fault.
    seals_until_failure: AtomicI64,
    unreadable: Mutex<HashSet<SealedValue>>,
}

impl FlakyProvider {
    pub fn new() -> Self {
        Self {
            inner: zk_provider(),
            seals_until_failure: AtomicI64::new(-1),
            unreadable: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_after_seals(&self, n: i64) {
        self.seals_until_failure.store(n, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.seals_until_failure.store(-1, Ordering::SeqCst);
    }

    pub fn make_unreadable(&self, sealed: &SealedValue) {
        self.unreadable.lock().unwrap().insert(sealed.clone());
    }
}

impl ConfidentialityProvider for FlakyProvider {
    fn seal(&self, amount: Amount, owner: &str) -> Result<SealedValue, ProviderError> {
        let left = self.seals_until_failure.load(Ordering::SeqCst);
        if left == 0 {
            return Err(ProviderError::Failure("injected seal failure".to_string()));
        }
        if left > 0 {
            self.seals_until_failure.fetch_sub(1, Ordering::SeqCst);
        }
        self.inner.seal(amount, owner)
    }

    fn unseal(&self, sealed: &SealedValue, owner: &str) -> Result<Amount, ProviderError> {
        if self.unreadable.lock().unwrap().contains(sealed) {
            return Err(ProviderError::Failure("injected unseal failure".to_string()));
        }
        self.inner.unseal(sealed, owner)
    }

    fn attest(&self, statement: Statement<'_>) -> Result<ProofToken, ProviderError> {
        self.inner.attest(statement)
    }

    fn check(&self, token: &ProofToken) -> Option<Attestation> {
        self.inner.check(token)
    }
}
