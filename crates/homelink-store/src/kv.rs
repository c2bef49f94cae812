//! The key-value contract and typed JSON helpers on top of it.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Well-known cache keys.
pub mod keys {
    /// JSON array of devices.
    pub const DEVICES: &str = "homelink:devices";
    /// JSON array of rooms.
    pub const ROOMS: &str = "homelink:rooms";
    /// JSON array of schedules.
    pub const SCHEDULES: &str = "homelink:schedules";
    /// Controller base URL.
    pub const SERVER_URL: &str = "homelink:serverUrl";
    /// Companion camera/stream URL.
    pub const CAMERA_URL: &str = "homelink:cameraUrl";
}

/// Durable string-keyed blob storage.
///
/// Values survive process restart. There are no transactions; each call is
/// applied on its own.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` if the key was never written or was removed.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Read and deserialize a JSON value.
pub async fn load_json<T, S>(store: &S, key: &str) -> Result<Option<T>>
where
    T: DeserializeOwned,
    S: KeyValueStore + ?Sized,
{
    match store.get(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| Error::Serialization {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

/// Serialize and write a JSON value.
pub async fn save_json<T, S>(store: &S, key: &str, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
    S: KeyValueStore + ?Sized,
{
    let raw = serde_json::to_string(value).map_err(|source| Error::Serialization {
        key: key.to_string(),
        source,
    })?;
    store.set(key, &raw).await
}
