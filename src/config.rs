use anyhow::{bail, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_DAILY_LIMIT: u32 = 20;
pub const DEFAULT_STORAGE_KEY: &str = "gemini-api-rate-limit";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub quota: QuotaSettings,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuotaSettings {
    pub storage_key: String,
    pub daily_limit: u32,
    /// Remaining quota at or below which the status is reported as low.
    pub low_threshold: u32,
    pub max_cas_retries: u32,
}

impl Default for QuotaSettings {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            daily_limit: DEFAULT_DAILY_LIMIT,
            low_threshold: 5,
            max_cas_retries: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    File,
    Redis,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "file" => Ok(StoreBackend::File),
            "redis" => Ok(StoreBackend::Redis),
            other => bail!("Unsupported quota store: {}", other),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub path: PathBuf,
    pub redis_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = QuotaSettings::default();

        let quota = QuotaSettings {
            storage_key: env::var("QUOTA_STORAGE_KEY")
                .unwrap_or_else(|_| defaults.storage_key.clone()),
            daily_limit: env::var("QUOTA_DAILY_LIMIT")
                .unwrap_or_else(|_| defaults.daily_limit.to_string())
                .parse()?,
            low_threshold: env::var("QUOTA_LOW_THRESHOLD")
                .unwrap_or_else(|_| defaults.low_threshold.to_string())
                .parse()?,
            max_cas_retries: env::var("QUOTA_MAX_CAS_RETRIES")
                .unwrap_or_else(|_| defaults.max_cas_retries.to_string())
                .parse()?,
        };

        if quota.daily_limit == 0 {
            bail!("QUOTA_DAILY_LIMIT must be greater than zero");
        }
        if quota.max_cas_retries == 0 {
            bail!("QUOTA_MAX_CAS_RETRIES must be greater than zero");
        }
        if quota.storage_key.trim().is_empty() {
            bail!("QUOTA_STORAGE_KEY must not be empty");
        }

        let store = StoreConfig {
            backend: env::var("QUOTA_STORE")
                .unwrap_or_else(|_| "file".to_string())
                .parse()?,
            path: env::var("QUOTA_STORE_PATH")
                .unwrap_or_else(|_| "./.codenexta/quota.json".to_string())
                .into(),
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
        };

        Ok(Config { quota, store })
    }
}
