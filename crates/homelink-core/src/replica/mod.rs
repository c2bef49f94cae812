//! Remote replica store.
//!
//! The replica is a server-held JSON tree shared by every client of a user.
//! Entities live under per-user paths (see [`RemotePaths`]) as maps keyed by
//! id. A [`Subscription`] delivers the *whole* value at its path when it is
//! attached and again after every change below that path; consumers replace
//! their collection wholesale rather than applying diffs.
//!
//! Two implementations are provided:
//!
//! - [`MemoryReplica`]: an in-process tree with live listeners, used by tests
//!   and offline demos
//! - [`RestReplica`]: a Firebase-style REST endpoint with a polling
//!   subscription

mod memory;
mod paths;
mod rest;

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::stream::Stream;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

pub use memory::MemoryReplica;
pub use paths::{RemotePaths, decode_collection, encode_record};
pub use rest::RestReplica;

/// Placeholder resolved to the server's clock (epoch millis) on write.
pub fn server_timestamp() -> Value {
    serde_json::json!({ ".sv": "timestamp" })
}

/// Whether `value` is the server timestamp placeholder.
pub fn is_server_timestamp(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|m| m.len() == 1 && m.get(".sv").and_then(Value::as_str) == Some("timestamp"))
}

/// A server-held, multi-client JSON tree.
///
/// Paths are `/`-separated; leading and trailing slashes are ignored. A
/// missing path reads as [`Value::Null`], and writing `null` deletes.
#[async_trait]
pub trait ReplicaStore: Send + Sync {
    /// Read the value at `path`.
    async fn get(&self, path: &str) -> Result<Value>;

    /// Replace the value at `path`.
    async fn set(&self, path: &str, value: Value) -> Result<()>;

    /// Merge children into `path`. Keys may themselves be sub-paths, and a
    /// `null` value deletes that child. Applied as one write.
    async fn update(&self, path: &str, children: Map<String, Value>) -> Result<()>;

    /// Delete the value at `path`.
    async fn remove(&self, path: &str) -> Result<()>;

    /// Append `value` under `path` with a server-assigned key. Keys sort in
    /// creation order.
    async fn push(&self, path: &str, value: Value) -> Result<String>;

    /// Subscribe to the value at `path`.
    async fn subscribe(&self, path: &str) -> Result<Subscription>;
}

/// A live registration on a replica path.
///
/// Yields the current value first, then the new value after each change.
/// The listener is released by [`dispose`](Self::dispose) or by dropping the
/// subscription.
pub struct Subscription {
    path: String,
    receiver: mpsc::UnboundedReceiver<Value>,
    cancel_token: CancellationToken,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("path", &self.path)
            .field("disposed", &self.cancel_token.is_cancelled())
            .finish()
    }
}

impl Subscription {
    /// Build a subscription from a channel fed by the replica. The replica
    /// must stop feeding once `cancel_token` is cancelled.
    pub fn new(
        path: impl Into<String>,
        receiver: mpsc::UnboundedReceiver<Value>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            path: path.into(),
            receiver,
            cancel_token,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Wait for the next value. `None` once disposed or when the replica
    /// side has gone away.
    pub async fn next_value(&mut self) -> Option<Value> {
        tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => None,
            value = self.receiver.recv() => value,
        }
    }

    /// Release the listener.
    pub fn dispose(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_disposed(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Token cancelled when the subscription is disposed.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl Stream for Subscription {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancel_token.is_cancelled() {
            return Poll::Ready(None);
        }
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}

/// Split a path into its non-empty segments.
pub(crate) fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Join path segments with `/`.
pub(crate) fn join(base: &str, child: &str) -> String {
    let base = base.trim_matches('/');
    let child = child.trim_matches('/');
    match (base.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{}/{}", base, child),
    }
}
