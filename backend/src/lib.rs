//! Private payroll ledger: employee registry, batch processing and employee-facing queries,
//! plus the HTTP and SQLite adapters the binary serves them through.

pub mod api;
pub mod batch;
pub mod binding;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod payroll;
pub mod query;
pub mod registry;
pub mod state;

pub use errors::PayrollError;
pub use payroll::Payroll;

#[cfg(test)]
pub(crate) mod test_support {
    use payroll_zk::groth16::KeyStore;
    use payroll_zk::{ConfidentialityProvider, ZkProvider};
    use std::sync::{Arc, OnceLock};

    /// One provider per test binary so Groth16 setup runs once per circuit shape.
    pub fn test_provider() -> Arc<dyn ConfidentialityProvider> {
        static PROVIDER: OnceLock<Arc<dyn ConfidentialityProvider>> = OnceLock::new();
        PROVIDER
            .get_or_init(|| Arc::new(ZkProvider::new([42u8; 32], KeyStore::in_memory())))
            .clone()
    }
}
