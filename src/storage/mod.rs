use std::sync::Arc;

use crate::config::{StoreBackend, StoreConfig};
use crate::errors::Result;

pub mod local;
pub mod memory;
pub mod redis;

pub use local::FileStore;
pub use memory::MemoryStore;
pub use self::redis::RedisStore;

/// Synchronous string key-value storage backing the quota record.
#[cfg_attr(test, mockall::automock)]
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Writes `value` only if the current value equals `expected`
    /// (`None` meaning the key is absent). Returns whether the write happened.
    fn compare_and_swap<'a>(&self, key: &str, expected: Option<&'a str>, value: &str) -> Result<bool>;

    fn remove(&self, key: &str) -> Result<()>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Box<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn compare_and_swap<'a>(&self, key: &str, expected: Option<&'a str>, value: &str) -> Result<bool> {
        (**self).compare_and_swap(key, expected, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn compare_and_swap<'a>(&self, key: &str, expected: Option<&'a str>, value: &str) -> Result<bool> {
        (**self).compare_and_swap(key, expected, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

pub fn create_store(config: &StoreConfig) -> Result<Box<dyn KeyValueStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Box::new(MemoryStore::new())),
        StoreBackend::File => {
            let store = FileStore::new(&config.path)?;
            Ok(Box::new(store))
        }
        StoreBackend::Redis => {
            let store = RedisStore::new(&config.redis_url)?;
            Ok(Box::new(store))
        }
    }
}
