//! Atomic key-value store abstraction shared across process instances.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(String),
    #[error("value at {0} has the wrong type for this operation")]
    WrongType(String),
}

/// Atomic operations over a shared expiring key-value store.
///
/// Counters and locks must never be held in process memory: every mutation
/// here maps to a single atomic operation on the backing store, so the
/// contract stays correct when several service instances share it.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Atomically increment an integer value, creating it at 1. The TTL is
    /// applied only when the key is created, so the period window is anchored
    /// at the first request of the period.
    async fn increment(
        &self,
        key: &str,
        ttl_on_create: Option<Duration>,
    ) -> Result<i64, StoreError>;

    /// SET-if-absent with expiry; returns whether this caller won the key.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Atomic check-and-delete: removes the key only if it currently holds
    /// `expected`.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError>;

    /// Atomic compare-and-swap. `expected = None` means "key must be absent".
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// Append to a list value, creating it with `ttl` when absent.
    async fn list_push(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn list_range(&self, key: &str) -> Result<Vec<String>, StoreError>;
}

#[derive(Debug, Clone)]
enum StoredValue {
    Text(String),
    List(Vec<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// In-process `KvStore` used by tests and single-node deployments. TTLs are
/// checked lazily on access against `tokio::time::Instant`, so expiry is
/// exercisable under a paused test clock.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn live_entry<'a>(map: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
    let now = Instant::now();
    if map.get(key).is_some_and(|e| e.is_expired(now)) {
        map.remove(key);
    }
    map.get_mut(key)
}

fn expiry(ttl: Option<Duration>) -> Option<Instant> {
    ttl.map(|ttl| Instant::now() + ttl)
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut map = self.entries.lock().await;
        match live_entry(&mut map, key) {
            Some(Entry {
                value: StoredValue::Text(text),
                ..
            }) => Ok(Some(text.clone())),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut map = self.entries.lock().await;
        map.insert(
            key.to_string(),
            Entry {
                value: StoredValue::Text(value.to_string()),
                expires_at: expiry(ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut map = self.entries.lock().await;
        let existed = live_entry(&mut map, key).is_some();
        map.remove(key);
        Ok(existed)
    }

    async fn increment(
        &self,
        key: &str,
        ttl_on_create: Option<Duration>,
    ) -> Result<i64, StoreError> {
        let mut map = self.entries.lock().await;
        match live_entry(&mut map, key) {
            Some(entry) => {
                let StoredValue::Text(text) = &entry.value else {
                    return Err(StoreError::WrongType(key.to_string()));
                };
                let current: i64 = text
                    .parse()
                    .map_err(|_| StoreError::WrongType(key.to_string()))?;
                let next = current + 1;
                entry.value = StoredValue::Text(next.to_string());
                Ok(next)
            }
            None => {
                map.insert(
                    key.to_string(),
                    Entry {
                        value: StoredValue::Text("1".to_string()),
                        expires_at: expiry(ttl_on_create),
                    },
                );
                Ok(1)
            }
        }
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut map = self.entries.lock().await;
        if live_entry(&mut map, key).is_some() {
            return Ok(false);
        }
        map.insert(
            key.to_string(),
            Entry {
                value: StoredValue::Text(value.to_string()),
                expires_at: expiry(Some(ttl)),
            },
        );
        Ok(true)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let mut map = self.entries.lock().await;
        let matches = matches!(
            live_entry(&mut map, key),
            Some(Entry {
                value: StoredValue::Text(text),
                ..
            }) if text == expected
        );
        if matches {
            map.remove(key);
        }
        Ok(matches)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let mut map = self.entries.lock().await;
        let current = match live_entry(&mut map, key) {
            Some(Entry {
                value: StoredValue::Text(text),
                ..
            }) => Some(text.clone()),
            Some(_) => return Err(StoreError::WrongType(key.to_string())),
            None => None,
        };
        if current.as_deref() != expected {
            return Ok(false);
        }
        map.insert(
            key.to_string(),
            Entry {
                value: StoredValue::Text(new.to_string()),
                expires_at: expiry(ttl),
            },
        );
        Ok(true)
    }

    async fn list_push(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut map = self.entries.lock().await;
        match live_entry(&mut map, key) {
            Some(Entry {
                value: StoredValue::List(items),
                ..
            }) => {
                items.push(value.to_string());
                Ok(())
            }
            Some(_) => Err(StoreError::WrongType(key.to_string())),
            None => {
                map.insert(
                    key.to_string(),
                    Entry {
                        value: StoredValue::List(vec![value.to_string()]),
                        expires_at: expiry(Some(ttl)),
                    },
                );
                Ok(())
            }
        }
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut map = self.entries.lock().await;
        match live_entry(&mut map, key) {
            Some(Entry {
                value: StoredValue::List(items),
                ..
            }) => Ok(items.clone()),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
            None => Ok(Vec::new()),
        }
    }
}
