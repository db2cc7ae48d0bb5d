use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuotaError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Quota record contention: gave up after {attempts} attempts")]
    Contention { attempts: u32 },
}

impl QuotaError {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            QuotaError::Storage(_) => "storage",
            QuotaError::Io(_) => "io",
            QuotaError::Serialization(_) => "serialization",
            QuotaError::Redis(_) => "redis",
            QuotaError::Contention { .. } => "contention",
        }
    }
}

pub type Result<T> = std::result::Result<T, QuotaError>;
