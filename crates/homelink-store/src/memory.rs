//! In-memory key-value store.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::kv::KeyValueStore;

/// Non-durable [`KeyValueStore`] for tests and ephemeral sessions.
///
/// Writes can be made to fail on demand to exercise best-effort persistence
/// paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
    write_count: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every subsequent `set`/`remove` while enabled.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> u32 {
        self.write_count.load(Ordering::Relaxed)
    }

    /// Snapshot a raw value without going through the async API.
    pub fn peek(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A poisoned map is still structurally valid.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_writable(&self, key: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(Error::WriteRejected(key.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check_writable(key)?;
        self.lock().insert(key.to_string(), value.to_string());
        self.write_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.check_writable(key)?;
        self.lock().remove(key);
        self.write_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{load_json, save_json};

    #[tokio::test]
    async fn test_round_trip_and_remove() {
        let store = MemoryStore::new();
        assert!(store.get("a").await.unwrap().is_none());

        store.set("a", "1").await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));

        store.remove("a").await.unwrap();
        store.remove("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
        assert_eq!(store.write_count(), 3);
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let store = MemoryStore::new();
        store.set("a", "1").await.unwrap();
        store.set_fail_writes(true);

        let err = store.set("a", "2").await.unwrap_err();
        assert!(matches!(err, Error::WriteRejected(ref k) if k == "a"));
        assert_eq!(store.peek("a").as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let store = MemoryStore::new();
        save_json(&store, "list", &vec![1, 2, 3]).await.unwrap();
        let back: Option<Vec<i32>> = load_json(&store, "list").await.unwrap();
        assert_eq!(back, Some(vec![1, 2, 3]));

        store.set("broken", "{not json").await.unwrap();
        let err = load_json::<Vec<i32>, _>(&store, "broken").await.unwrap_err();
        assert!(matches!(err, Error::Serialization { .. }));
    }
}
