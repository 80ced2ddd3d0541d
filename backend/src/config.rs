use crate::errors::ConfigError;
use std::path::PathBuf;
use std::time::Duration;

/// Backend settings, read once from the environment.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    /// `BACKEND_ADDR`
    pub addr: String,
    /// `PAYROLL_DATA_DIR`: database, proving keys and the generated seal key live here.
    pub data_dir: PathBuf,
    /// `PAYROLL_SEAL_KEY`: 64 hex chars. Generated and stored under `data_dir` when absent.
    pub seal_key: Option<[u8; 32]>,
    /// `PAYROLL_SETTLEMENT_DELAY_MS`
    pub settlement_delay: Duration,
    /// `API_KEY`: required on employer routes.
    pub api_key: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
            data_dir: PathBuf::from("data"),
            seal_key: None,
            settlement_delay: Duration::from_millis(2000),
            api_key: "dev-secret-key".to_string(),
        }
    }
}

pub fn parse_seal_key(hex_key: &str) -> Result<[u8; 32], ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid { name: "PAYROLL_SEAL_KEY", reason };
    let bytes = hex::decode(hex_key.trim()).map_err(|e| invalid(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| invalid(format!("expected 32 bytes, got {}", b.len())))
}

impl BackendConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as `from_env` with an injectable variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let settlement_delay = match var("PAYROLL_SETTLEMENT_DELAY_MS") {
            Some(ms) => Duration::from_millis(ms.trim().parse().map_err(|e| ConfigError::Invalid {
                name: "PAYROLL_SETTLEMENT_DELAY_MS",
                reason: format!("{e}"),
            })?),
            None => defaults.settlement_delay,
        };

        Ok(Self {
            addr: var("BACKEND_ADDR").unwrap_or(defaults.addr),
            data_dir: var("PAYROLL_DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            seal_key: var("PAYROLL_SEAL_KEY").as_deref().map(parse_seal_key).transpose()?,
            settlement_delay,
            api_key: var("API_KEY").unwrap_or(defaults.api_key),
        })
    }
}
