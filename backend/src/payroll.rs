//! In-process entry point the presentation layer talks to.

use crate::batch::{BatchProcessor, PayrollRun};
use crate::errors::PayrollError;
use crate::models::{
    BatchVerification, CommittedRun, Employee, EmployeeUpdate, NewEmployee, PayrollBatch, PayrollSummary, RunPhase,
    ViewOutcome,
};
use crate::query;
use crate::registry::{enroll, seal_salary, EmployeeRegistry};
use payroll_zk::{ConfidentialityProvider, ProofToken, ProviderError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

struct Inner {
    provider: Arc<dyn ConfidentialityProvider>,
    registry: RwLock<EmployeeRegistry>,
    processor: BatchProcessor,
}

/// Cheap to clone; all clones share one registry and one history.
#[derive(Clone)]
pub struct Payroll {
    inner: Arc<Inner>,
}

async fn blocking<T, F>(f: F) -> Result<T, PayrollError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PayrollError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PayrollError::Provider(ProviderError::Failure(format!("provider task failed: {e}"))))?
}

impl Payroll {
    pub fn new(provider: Arc<dyn ConfidentialityProvider>, settlement_delay: Duration) -> Self {
        Self::restore(provider, EmployeeRegistry::new(), Vec::new(), settlement_delay)
    }

    /// Resume from persisted state. `history` is most recent first.
    pub fn restore(
        provider: Arc<dyn ConfidentialityProvider>,
        registry: EmployeeRegistry,
        history: Vec<PayrollBatch>,
        settlement_delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                registry: RwLock::new(registry),
                processor: BatchProcessor::new(history, settlement_delay),
            }),
        }
    }

    pub fn provider(&self) -> &Arc<dyn ConfidentialityProvider> {
        &self.inner.provider
    }

    pub(crate) fn registry(&self) -> &RwLock<EmployeeRegistry> {
        &self.inner.registry
    }

    pub(crate) fn processor(&self) -> &BatchProcessor {
        &self.inner.processor
    }

    pub async fn register(&self, input: NewEmployee) -> Result<Employee, PayrollError> {
        let validated = self.registry().read().await.validate(&input)?;

        let provider = self.provider().clone();
        let employee = blocking(move || enroll(provider.as_ref(), validated)).await?;

        let mut registry = self.registry().write().await;
        let employee = registry.insert(employee)?.clone();
        info!(employee_id = %employee.id, wallet = %employee.wallet, "employee registered");
        Ok(employee)
    }

    /// Edit name, role or salary. Batches already committed are unaffected.
    pub async fn update(&self, id: Uuid, update: EmployeeUpdate) -> Result<Employee, PayrollError> {
        let (validated, wallet) = {
            let registry = self.registry().read().await;
            let validated = registry.validate_update(id, &update)?;
            let wallet = registry.get(id).map(|e| e.wallet.clone()).ok_or(PayrollError::UnknownEmployee(id))?;
            (validated, wallet)
        };

        let sealed = match validated.salary {
            Some(salary) => {
                let provider = self.provider().clone();
                Some(blocking(move || seal_salary(provider.as_ref(), &wallet, salary)).await?)
            }
            None => None,
        };

        let mut registry = self.registry().write().await;
        let employee = registry.apply_update(id, validated, sealed)?.clone();
        info!(employee_id = %id, "employee updated");
        Ok(employee)
    }

    pub async fn find_by_wallet(&self, wallet: &str) -> Option<Employee> {
        self.registry().read().await.find_by_wallet(wallet).cloned()
    }

    /// Registration index of `id`.
    pub async fn position(&self, id: Uuid) -> Option<usize> {
        self.registry().read().await.position(id)
    }

    pub async fn get(&self, id: Uuid) -> Option<Employee> {
        self.registry().read().await.get(id).cloned()
    }

    pub async fn list_all(&self) -> Vec<Employee> {
        self.registry().read().await.list_all().to_vec()
    }

    /// Claim the run slot and snapshot the registry without committing yet.
    pub async fn begin_run(&self) -> Result<PayrollRun, PayrollError> {
        PayrollRun::begin(self.clone()).await.inspect_err(|e| {
            if matches!(e, PayrollError::ConcurrentRunRejected) {
                warn!("payroll run rejected: another run is in progress");
            }
        })
    }

    /// Run payroll to completion.
    pub async fn start_run(&self) -> Result<PayrollBatch, PayrollError> {
        self.begin_run().await?.execute().await
    }

    /// Run payroll to completion, also returning the ledgers as this run's commit left them.
    ///
    /// Persist these rather than re-reading the registry: by the time the caller looks, a later run
    /// may already have moved the ledgers on.
    pub async fn start_run_with_ledgers(&self) -> Result<CommittedRun, PayrollError> {
        self.begin_run().await?.execute_with_ledgers().await
    }

    pub fn phase(&self) -> RunPhase {
        self.processor().phase()
    }

    /// Most recent first.
    pub async fn history(&self) -> Vec<PayrollBatch> {
        self.processor().history.read().await.iter().cloned().collect()
    }

    pub async fn batch(&self, id: Uuid) -> Option<PayrollBatch> {
        self.processor().history.read().await.iter().find(|b| b.id == id).cloned()
    }

    pub async fn own_view(&self, wallet: &str, reveal: bool) -> ViewOutcome {
        let registry = self.registry().read().await;
        let history = self.processor().history.read().await;
        query::own_view(self.provider().as_ref(), &registry, &history, wallet, reveal)
    }

    pub async fn summary(&self) -> Result<PayrollSummary, PayrollError> {
        let registry = self.registry().read().await;
        let history = self.processor().history.read().await;
        query::summary(&registry, &history)
    }

    pub async fn verify_batch(&self, id: Uuid) -> Option<BatchVerification> {
        let batch = self.batch(id).await?;
        let provider = self.provider().clone();
        // Verification is pairing-heavy; keep it off the async workers.
        tokio::task::spawn_blocking(move || query::verify_batch(provider.as_ref(), &batch))
            .await
            .ok()
    }

    pub async fn verify_proof(&self, token: ProofToken) -> bool {
        let provider = self.provider().clone();
        tokio::task::spawn_blocking(move || provider.verify(&token))
            .await
            .unwrap_or(false)
    }
}
