//! In-process replica tree with live listeners.
//!
//! Behaves like a real-time database: `null` deletes, empty objects vanish,
//! server timestamp placeholders resolve on write, and listeners receive the
//! whole value at their path whenever it changes. Writes can be made to fail
//! for testing best-effort paths.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use homelink_types::now_millis;

use super::{ReplicaStore, Subscription, is_server_timestamp, join, segments};
use crate::error::{Error, Result};

struct Listener {
    path: String,
    sender: mpsc::UnboundedSender<Value>,
    cancel_token: CancellationToken,
    last: Value,
}

struct Inner {
    root: Value,
    listeners: Vec<Listener>,
    last_push: (i64, u32),
}

/// An in-memory [`ReplicaStore`].
pub struct MemoryReplica {
    inner: Mutex<Inner>,
    fail_writes: AtomicBool,
    /// Writes still allowed before failing; `u32::MAX` means unlimited.
    writes_before_failure: AtomicU32,
    write_count: AtomicU32,
}

impl std::fmt::Debug for MemoryReplica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryReplica")
            .field("write_count", &self.write_count.load(Ordering::Relaxed))
            .field("fail_writes", &self.fail_writes.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MemoryReplica {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryReplica {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                root: Value::Null,
                listeners: Vec::new(),
                last_push: (0, 0),
            }),
            fail_writes: AtomicBool::new(false),
            writes_before_failure: AtomicU32::new(u32::MAX),
            write_count: AtomicU32::new(0),
        }
    }

    /// Make every subsequent write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Allow `n` more writes, then fail the rest.
    pub fn fail_after_writes(&self, n: u32) {
        self.writes_before_failure.store(n, Ordering::SeqCst);
    }

    /// Number of accepted writes.
    pub fn write_count(&self) -> u32 {
        self.write_count.load(Ordering::SeqCst)
    }

    /// Number of live listeners.
    pub fn listener_count(&self) -> usize {
        let mut inner = self.lock();
        prune(&mut inner.listeners);
        inner.listeners.len()
    }

    /// Synchronous read of the current value at `path`.
    pub fn peek(&self, path: &str) -> Value {
        value_at(&self.lock().root, &segments(path))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit_write(&self, path: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::remote_write(path, "write rejected"));
        }
        let admitted = self
            .writes_before_failure
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                u32::MAX => Some(u32::MAX),
                0 => None,
                n => Some(n - 1),
            });
        if admitted.is_err() {
            return Err(Error::remote_write(path, "write rejected"));
        }
        self.write_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Apply a batch of (path, value) writes and notify listeners once.
    fn write(&self, writes: Vec<(String, Value)>) {
        let now = now_millis();
        let mut inner = self.lock();
        for (path, value) in writes {
            let value = normalize(resolve_timestamps(value, now));
            set_at(&mut inner.root, &segments(&path), value);
        }
        notify(&mut inner);
    }
}

#[async_trait]
impl ReplicaStore for MemoryReplica {
    async fn get(&self, path: &str) -> Result<Value> {
        Ok(self.peek(path))
    }

    async fn set(&self, path: &str, value: Value) -> Result<()> {
        self.admit_write(path)?;
        debug!("replica set {}", path);
        self.write(vec![(path.to_string(), value)]);
        Ok(())
    }

    async fn update(&self, path: &str, children: Map<String, Value>) -> Result<()> {
        self.admit_write(path)?;
        debug!("replica update {} ({} children)", path, children.len());
        let writes = children
            .into_iter()
            .map(|(child, value)| (join(path, &child), value))
            .collect();
        self.write(writes);
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.admit_write(path)?;
        debug!("replica remove {}", path);
        self.write(vec![(path.to_string(), Value::Null)]);
        Ok(())
    }

    async fn push(&self, path: &str, value: Value) -> Result<String> {
        self.admit_write(path)?;
        let key = {
            let mut inner = self.lock();
            let now = now_millis();
            let (last_ms, last_seq) = inner.last_push;
            let next = if now > last_ms {
                (now, 0)
            } else {
                (last_ms, last_seq.saturating_add(1))
            };
            inner.last_push = next;
            push_key(next.0, next.1)
        };
        self.write(vec![(join(path, &key), value)]);
        Ok(key)
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let mut inner = self.lock();
        let current = value_at(&inner.root, &segments(path));
        // Receiver is alive, so the first send cannot fail.
        let _ = sender.send(current.clone());
        inner.listeners.push(Listener {
            path: path.to_string(),
            sender,
            cancel_token: cancel_token.clone(),
            last: current,
        });
        Ok(Subscription::new(path, receiver, cancel_token))
    }
}

/// Lexicographically ordered push key.
fn push_key(millis: i64, seq: u32) -> String {
    format!("-{:012x}{:06x}", millis.max(0), seq)
}

fn prune(listeners: &mut Vec<Listener>) {
    listeners.retain(|l| !l.cancel_token.is_cancelled() && !l.sender.is_closed());
}

fn notify(inner: &mut Inner) {
    prune(&mut inner.listeners);
    let root = &inner.root;
    for listener in inner.listeners.iter_mut() {
        let current = value_at(root, &segments(&listener.path));
        if current != listener.last {
            listener.last = current.clone();
            let _ = listener.sender.send(current);
        }
    }
}

fn value_at(root: &Value, segs: &[&str]) -> Value {
    let mut node = root;
    for seg in segs {
        match node.get(*seg) {
            Some(child) => node = child,
            None => return Value::Null,
        }
    }
    node.clone()
}

fn set_at(node: &mut Value, segs: &[&str], value: Value) {
    let Some((first, rest)) = segs.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        if value.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }
    let Value::Object(map) = node else {
        return;
    };
    if rest.is_empty() {
        if value.is_null() {
            map.remove(*first);
        } else {
            map.insert((*first).to_string(), value);
        }
        return;
    }
    let child = map.entry((*first).to_string()).or_insert(Value::Null);
    set_at(child, rest, value);
    if is_empty(child) {
        map.remove(*first);
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Drop `null` children and empty objects, like a real-time database does.
fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, normalize(v)))
                .filter(|(_, v)| !is_empty(v))
                .collect();
            if cleaned.is_empty() {
                Value::Null
            } else {
                Value::Object(cleaned)
            }
        }
        other => other,
    }
}

fn resolve_timestamps(value: Value, now: i64) -> Value {
    if is_server_timestamp(&value) {
        return Value::from(now);
    }
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, resolve_timestamps(v, now)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| resolve_timestamps(v, now))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replica::server_timestamp;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_remove() {
        let replica = MemoryReplica::new();
        replica
            .set("devices/u1/led-1", json!({"name": "Lamp", "isOn": false}))
            .await
            .unwrap();
        assert_eq!(
            replica.get("devices/u1/led-1/name").await.unwrap(),
            json!("Lamp")
        );

        replica.remove("devices/u1/led-1").await.unwrap();
        assert_eq!(replica.get("devices/u1").await.unwrap(), Value::Null);
        assert_eq!(replica.get("devices").await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_nulls_and_empty_objects_vanish() {
        let replica = MemoryReplica::new();
        replica
            .set("a", json!({"b": null, "c": {}, "d": 1}))
            .await
            .unwrap();
        assert_eq!(replica.peek("a"), json!({"d": 1}));
    }

    #[tokio::test]
    async fn test_update_merges_and_deletes() {
        let replica = MemoryReplica::new();
        replica.set("h", json!({"k1": 1, "k2": 2})).await.unwrap();

        let mut children = Map::new();
        children.insert("k1".into(), Value::Null);
        children.insert("k3".into(), json!(3));
        children.insert("nested/x".into(), json!(true));
        replica.update("h", children).await.unwrap();

        assert_eq!(
            replica.peek("h"),
            json!({"k2": 2, "k3": 3, "nested": {"x": true}})
        );
        assert_eq!(replica.write_count(), 2);
    }

    #[tokio::test]
    async fn test_push_keys_are_ordered_and_timestamps_resolve() {
        let replica = MemoryReplica::new();
        let mut keys = Vec::new();
        for i in 0..20 {
            keys.push(
                replica
                    .push("log", json!({"n": i, "timestamp": server_timestamp()}))
                    .await
                    .unwrap(),
            );
        }
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);

        let first = replica.peek(&format!("log/{}", keys[0]));
        assert!(first["timestamp"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_subscription_receives_initial_and_changes() {
        let replica = MemoryReplica::new();
        replica.set("devices/u1/a", json!({"isOn": false})).await.unwrap();

        let mut sub = replica.subscribe("devices/u1").await.unwrap();
        assert_eq!(sub.next_value().await.unwrap(), json!({"a": {"isOn": false}}));

        replica.set("devices/u1/a/isOn", json!(true)).await.unwrap();
        assert_eq!(sub.next_value().await.unwrap(), json!({"a": {"isOn": true}}));

        // Unrelated write does not wake the listener
        replica.set("rooms/u1/r", json!({"name": "R"})).await.unwrap();
        replica.remove("devices/u1").await.unwrap();
        assert_eq!(sub.next_value().await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_disposed_listener_is_pruned() {
        let replica = MemoryReplica::new();
        let sub = replica.subscribe("x").await.unwrap();
        assert_eq!(replica.listener_count(), 1);
        sub.dispose();
        assert_eq!(replica.listener_count(), 0);

        let sub = replica.subscribe("x").await.unwrap();
        drop(sub);
        assert_eq!(replica.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_write_failure_injection() {
        let replica = MemoryReplica::new();
        replica.set_fail_writes(true);
        let err = replica.set("a", json!(1)).await.unwrap_err();
        assert!(matches!(err, Error::RemoteWriteFailed { .. }));
        assert_eq!(replica.peek("a"), Value::Null);

        replica.set_fail_writes(false);
        replica.fail_after_writes(1);
        replica.set("a", json!(1)).await.unwrap();
        assert!(replica.set("b", json!(2)).await.is_err());
        assert_eq!(replica.write_count(), 1);
    }
}
