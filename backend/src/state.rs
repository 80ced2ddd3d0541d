use crate::config::{parse_seal_key, BackendConfig};
use crate::db::{self, Db};
use crate::errors::ConfigError;
use crate::payroll::Payroll;
use crate::registry::EmployeeRegistry;
use payroll_zk::groth16::KeyStore;
use payroll_zk::ZkProvider;
use rand::RngCore;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct AppState {
    pub payroll: Payroll,
    pub db: Db,
    pub api_key: Arc<str>,
    /// Held across an in-memory registry change and its row write, so rows land in registry order.
    pub writes: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(payroll: Payroll, db: Db, api_key: &str) -> Self {
        Self { payroll, db, api_key: Arc::from(api_key), writes: Arc::new(Mutex::new(())) }
    }

    /// Open the database, load keys and restore the registry and history.
    pub async fn init(config: &BackendConfig) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        std::fs::create_dir_all(&config.data_dir)?;

        let master_key = match config.seal_key {
            Some(key) => key,
            None => load_or_create_seal_key(&config.data_dir.join("keys").join("seal.key"))?,
        };
        let provider = ZkProvider::new(master_key, KeyStore::persistent(config.data_dir.join("keys")));

        let db_path = config.data_dir.join("payroll.sqlite");
        let db = db::connect(&format!("sqlite:{}", db_path.to_string_lossy())).await?;
        db::init_schema(&db).await?;

        let registry = EmployeeRegistry::from_employees(db::load_employees(&db).await?)?;
        let history = db::load_batches(&db).await?;
        tracing::info!(employees = registry.len(), batches = history.len(), "payroll state restored");

        let payroll = Payroll::restore(Arc::new(provider), registry, history, config.settlement_delay);
        Ok(Self::new(payroll, db, &config.api_key))
    }
}

/// The sealing master key must survive restarts or every stored seal becomes unreadable.
fn load_or_create_seal_key(path: &Path) -> Result<[u8; 32], ConfigError> {
    if path.exists() {
        return parse_seal_key(&std::fs::read_to_string(path)?);
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut key = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut key);
    std::fs::write(path, hex::encode(key))?;
    tracing::info!(path = %path.display(), "generated seal key");
    Ok(key)
}
