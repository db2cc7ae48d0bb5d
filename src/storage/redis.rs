use std::sync::{Mutex, PoisonError};

use redis::{Client, Commands, Connection, Script};

use crate::{errors::Result, storage::KeyValueStore};

// ARGV[1] = "1" when the key is expected to be absent
const COMPARE_AND_SWAP: &str = r#"
    local current = redis.call('GET', KEYS[1])
    if ARGV[1] == '1' then
        if current then
            return 0
        end
    elseif current ~= ARGV[2] then
        return 0
    end
    redis.call('SET', KEYS[1], ARGV[3])
    return 1
"#;

/// Shared store for clients that should see the same quota across machines.
pub struct RedisStore {
    connection: Mutex<Connection>,
    cas_script: Script,
}

impl RedisStore {
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let connection = client.get_connection()?;

        Ok(Self {
            connection: Mutex::new(connection),
            cas_script: Script::new(COMPARE_AND_SWAP),
        })
    }

    fn with_connection<T>(&self, f: impl FnOnce(&mut Connection) -> redis::RedisResult<T>) -> Result<T> {
        let mut conn = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(f(&mut conn)?)
    }
}

impl KeyValueStore for RedisStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_connection(|conn| conn.get(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.with_connection(|conn| conn.set(key, value))
    }

    fn compare_and_swap<'a>(&self, key: &str, expected: Option<&'a str>, value: &str) -> Result<bool> {
        let swapped: i32 = self.with_connection(|conn| {
            self.cas_script
                .key(key)
                .arg(if expected.is_none() { "1" } else { "0" })
                .arg(expected.unwrap_or_default())
                .arg(value)
                .invoke(conn)
        })?;

        Ok(swapped == 1)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.with_connection(|conn| conn.del(key))
    }
}
