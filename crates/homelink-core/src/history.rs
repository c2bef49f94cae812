//! Bounded device history stored in the replica.
//!
//! Entries are appended with a server-assigned, creation-ordered key and a
//! server timestamp, then the collection is trimmed back to its cap by
//! deleting the oldest keys in one batched update. History is account data:
//! without a session there is nothing to record to and no local fallback.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::debug;

use homelink_types::{HistoryEntry, ScheduleAction};

use crate::error::{Error, Result};
use crate::events::{EventDispatcher, HubEvent};
use crate::identity::Session;
use crate::replica::{RemotePaths, ReplicaStore, decode_collection, server_timestamp};

/// Maximum number of stored history entries.
pub const DEFAULT_HISTORY_CAP: usize = 100;

/// Default number of entries returned by a read.
pub const DEFAULT_READ_WINDOW: usize = 20;

/// Appends and reads device history.
#[derive(Clone)]
pub struct HistoryRecorder {
    replica: Arc<dyn ReplicaStore>,
    session: Session,
    events: EventDispatcher,
    cap: usize,
}

impl std::fmt::Debug for HistoryRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryRecorder")
            .field("cap", &self.cap)
            .field("uid", &self.session.uid())
            .finish()
    }
}

impl HistoryRecorder {
    pub fn new(replica: Arc<dyn ReplicaStore>, session: Session, events: EventDispatcher) -> Self {
        Self {
            replica,
            session,
            events,
            cap: DEFAULT_HISTORY_CAP,
        }
    }

    /// Set the maximum number of stored entries.
    #[must_use]
    pub fn cap(mut self, cap: usize) -> Self {
        self.cap = cap.max(1);
        self
    }

    fn paths(&self) -> Result<RemotePaths> {
        self.session
            .uid()
            .map(RemotePaths::new)
            .ok_or(Error::Unauthenticated)
    }

    /// Append one entry, then trim to the cap. Returns the new entry's key.
    pub async fn record(&self, device_id: &str, action: ScheduleAction) -> Result<String> {
        let paths = self.paths()?;
        let path = paths.history();

        let key = self
            .replica
            .push(
                &path,
                json!({
                    "deviceId": device_id,
                    "action": action,
                    "timestamp": server_timestamp(),
                }),
            )
            .await?;
        debug!("Recorded {} {} as {}", device_id, action, key);
        self.events.send(HubEvent::HistoryRecorded {
            device_id: device_id.to_string(),
            action,
        });

        self.trim(&path).await?;
        Ok(key)
    }

    async fn trim(&self, path: &str) -> Result<()> {
        let current = self.replica.get(path).await?;
        let Value::Object(entries) = current else {
            return Ok(());
        };
        if entries.len() <= self.cap {
            return Ok(());
        }

        let mut keys: Vec<&String> = entries.keys().collect();
        keys.sort();
        let excess = keys.len() - self.cap;
        let deletions: Map<String, Value> = keys
            .into_iter()
            .take(excess)
            .map(|k| (k.clone(), Value::Null))
            .collect();
        debug!("Trimming {} history entries", deletions.len());
        self.replica.update(path, deletions).await
    }

    /// The most recent `limit` entries, newest first.
    pub async fn read(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let paths = self.paths()?;
        let value = self.replica.get(&paths.history()).await?;
        let mut entries: Vec<HistoryEntry> = decode_collection(&value);
        entries.sort_by(|a, b| b.id.cmp(&a.id));
        entries.truncate(limit);
        Ok(entries)
    }
}
