//! The engine facade.
//!
//! [`Hub`] wires the entity store, synchronization engine, command
//! dispatcher, connection monitor and history recorder around the four
//! collaborators a client provides: a local cache, a remote replica, a
//! controller and an identity provider.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use homelink_core::{Hub, HubConfig, MemoryReplica, MockController, StaticIdentity};
//! use homelink_store::MemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> homelink_core::Result<()> {
//!     let hub = Hub::start(
//!         HubConfig::default(),
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(MemoryReplica::new()),
//!         Arc::new(MockController::new()),
//!         &StaticIdentity::signed_out(),
//!     )
//!     .await?;
//!
//!     let outcome = hub.toggle("led-1").await;
//!     assert_eq!(outcome.state, Some(true));
//!     hub.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use homelink_store::{KeyValueStore, keys};
use homelink_types::{ConnectionStatus, Device, HistoryEntry, Room, Schedule};

use crate::controller::normalize_base_url;
use crate::dispatcher::{CommandDispatcher, DEFAULT_COMMAND_TIMEOUT};
use crate::error::{Error, Result};
use crate::events::EventDispatcher;
use crate::history::{DEFAULT_HISTORY_CAP, DEFAULT_READ_WINDOW, HistoryRecorder};
use crate::identity::{IdentityProvider, Session};
use crate::monitor::{ConnectionMonitor, DEFAULT_HEALTH_TIMEOUT};
use crate::replica::ReplicaStore;
use crate::retry::RetryConfig;
use crate::state::EntityStore;
use crate::sync::SyncEngine;
use crate::traits::Controller;

/// Controller address used until one is configured.
pub const DEFAULT_SERVER_URL: &str = "http://10.0.2.2:8080";

/// Camera stream address used until one is configured.
pub const DEFAULT_CAMERA_URL: &str = "http://10.0.2.2:8081";

/// Runtime configuration for a [`Hub`].
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Controller base URL, unless one is persisted in the cache.
    pub server_url: String,
    /// Camera stream URL, unless one is persisted in the cache.
    pub camera_url: String,
    /// Bound on each toggle attempt.
    pub command_timeout: Duration,
    /// Bound on each health probe.
    pub health_timeout: Duration,
    /// Retry policy for toggles.
    pub toggle_retry: RetryConfig,
    /// Stored history entries.
    pub history_cap: usize,
    /// Entries returned by [`Hub::history`] when no limit is given.
    pub history_window: usize,
    /// Event channel capacity.
    pub event_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            camera_url: DEFAULT_CAMERA_URL.to_string(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
            toggle_retry: RetryConfig::for_toggle(),
            history_cap: DEFAULT_HISTORY_CAP,
            history_window: DEFAULT_READ_WINDOW,
            event_capacity: 100,
        }
    }
}

impl HubConfig {
    #[must_use]
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    #[must_use]
    pub fn camera_url(mut self, url: impl Into<String>) -> Self {
        self.camera_url = url.into();
        self
    }

    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    #[must_use]
    pub fn health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    #[must_use]
    pub fn toggle_retry(mut self, retry: RetryConfig) -> Self {
        self.toggle_retry = retry;
        self
    }

    #[must_use]
    pub fn history_cap(mut self, cap: usize) -> Self {
        self.history_cap = cap;
        self
    }

    #[must_use]
    pub fn history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Check the configuration, normalizing both URLs.
    pub fn validate(&mut self) -> Result<()> {
        self.server_url = normalize_base_url(&self.server_url)?;
        self.camera_url = normalize_base_url(&self.camera_url)?;
        self.toggle_retry.validate()?;
        if self.command_timeout.is_zero() || self.health_timeout.is_zero() {
            return Err(Error::InvalidConfig("timeouts must be non-zero".into()));
        }
        if self.history_cap == 0 {
            return Err(Error::InvalidConfig("history_cap must be at least 1".into()));
        }
        if self.event_capacity == 0 {
            return Err(Error::InvalidConfig(
                "event_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Result of [`Hub::toggle`] in the shape front ends render:
/// `{"success":true,"state":true}` or `{"success":false,"error":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToggleOutcome {
    pub fn toggled(state: bool) -> Self {
        Self {
            success: true,
            state: Some(state),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            state: None,
            error: Some(error.into()),
        }
    }
}

impl From<Result<bool>> for ToggleOutcome {
    fn from(result: Result<bool>) -> Self {
        match result {
            Ok(state) => Self::toggled(state),
            Err(e) => Self::failed(e.to_string()),
        }
    }
}

struct Follower {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

/// A running engine instance.
pub struct Hub {
    config: HubConfig,
    state: Arc<EntityStore>,
    events: EventDispatcher,
    cache: Arc<dyn KeyValueStore>,
    controller: Arc<dyn Controller>,
    sync: Arc<SyncEngine>,
    dispatcher: CommandDispatcher,
    monitor: ConnectionMonitor,
    history: HistoryRecorder,
    camera_url: RwLock<String>,
    follower: Mutex<Option<Follower>>,
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("server_url", &self.controller.base_url())
            .field("camera_url", &self.camera_url())
            .field("uid", &self.sync.attached_uid())
            .finish()
    }
}

impl Hub {
    /// Build the engine and bring it up.
    ///
    /// Applies persisted URLs (falling back to `config`), loads the local
    /// cache, then follows `identity`: if a user is already signed in, the
    /// replica subscriptions are open by the time this returns.
    pub async fn start(
        mut config: HubConfig,
        cache: Arc<dyn KeyValueStore>,
        replica: Arc<dyn ReplicaStore>,
        controller: Arc<dyn Controller>,
        identity: &dyn IdentityProvider,
    ) -> Result<Self> {
        config.validate()?;

        let server_url = persisted_url(cache.as_ref(), keys::SERVER_URL)
            .await
            .unwrap_or_else(|| config.server_url.clone());
        controller.set_base_url(&server_url)?;
        let camera_url = persisted_url(cache.as_ref(), keys::CAMERA_URL)
            .await
            .unwrap_or_else(|| config.camera_url.clone());
        info!("Controller at {}, camera at {}", server_url, camera_url);

        let state = Arc::new(EntityStore::new());
        let events = EventDispatcher::new(config.event_capacity);
        let sync = Arc::new(SyncEngine::new(
            Arc::clone(&state),
            Arc::clone(&cache),
            Arc::clone(&replica),
            events.clone(),
        ));
        let history = HistoryRecorder::new(Arc::clone(&replica), sync.session(), events.clone())
            .cap(config.history_cap);
        let dispatcher = CommandDispatcher::new(
            Arc::clone(&controller),
            Arc::clone(&state),
            Arc::clone(&sync),
            history.clone(),
            events.clone(),
        )
        .retry(config.toggle_retry.clone())
        .command_timeout(config.command_timeout);
        let monitor = ConnectionMonitor::new(Arc::clone(&controller), Arc::clone(&state), events.clone())
            .timeout(config.health_timeout);

        sync.load_local().await;
        let cancel_token = CancellationToken::new();
        let handle = sync.follow(identity, cancel_token.clone()).await;

        Ok(Self {
            config,
            state,
            events,
            cache,
            controller,
            sync,
            dispatcher,
            monitor,
            history,
            camera_url: RwLock::new(camera_url),
            follower: Mutex::new(Some(Follower {
                cancel_token,
                handle,
            })),
        })
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// The entity store. Subscribe to its collections to observe changes.
    pub fn state(&self) -> &Arc<EntityStore> {
        &self.state
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    pub fn sync(&self) -> &Arc<SyncEngine> {
        &self.sync
    }

    pub fn session(&self) -> Session {
        self.sync.session()
    }

    // --- Commands ---

    /// Flip a device through the controller.
    pub async fn toggle(&self, device_id: &str) -> ToggleOutcome {
        self.dispatcher.toggle(device_id).await.into()
    }

    /// Like [`Hub::toggle`], keeping the typed error.
    pub async fn try_toggle(&self, device_id: &str) -> Result<bool> {
        self.dispatcher.toggle(device_id).await
    }

    /// Probe the controller once.
    pub async fn check_connection(&self) -> ConnectionStatus {
        self.monitor.check_connection().await
    }

    // --- Configuration ---

    pub fn server_url(&self) -> String {
        self.controller.base_url()
    }

    /// Point at a new controller, persist it, and probe it.
    pub async fn set_server_url(&self, url: &str) -> Result<ConnectionStatus> {
        let url = normalize_base_url(url)?;
        self.controller.set_base_url(&url)?;
        info!("Controller URL set to {}", url);
        self.persist_setting(keys::SERVER_URL, &url).await;
        Ok(self.check_connection().await)
    }

    pub fn camera_url(&self) -> String {
        self.camera_url
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Set and persist the camera stream URL.
    pub async fn set_camera_url(&self, url: &str) -> Result<()> {
        let url = normalize_base_url(url)?;
        *self
            .camera_url
            .write()
            .unwrap_or_else(PoisonError::into_inner) = url.clone();
        info!("Camera URL set to {}", url);
        self.persist_setting(keys::CAMERA_URL, &url).await;
        Ok(())
    }

    async fn persist_setting(&self, key: &str, value: &str) {
        if let Err(e) = self.cache.set(key, value).await {
            warn!("Could not persist {}: {}", key, e);
        }
    }

    // --- History ---

    /// Recent history, newest first. Defaults to the configured window.
    pub async fn history(&self, limit: Option<usize>) -> Result<Vec<HistoryEntry>> {
        self.history
            .read(limit.unwrap_or(self.config.history_window))
            .await
    }

    // --- Write path ---

    pub async fn add_device(&self, device: Device) -> Result<Device> {
        self.sync.add_device(device).await
    }

    pub async fn update_device_brightness(&self, id: &str, brightness: u8) -> Result<Device> {
        self.sync.update_device_brightness(id, brightness).await
    }

    pub async fn rename_device(&self, id: &str, name: &str) -> Result<Device> {
        self.sync.rename_device(id, name).await
    }

    pub async fn assign_device_room(&self, id: &str, room: Option<&str>) -> Result<Device> {
        self.sync.assign_device_room(id, room).await
    }

    pub async fn remove_device(&self, id: &str) -> Result<()> {
        self.sync.remove_device(id).await
    }

    pub async fn add_room(&self, room: Room) -> Result<Room> {
        self.sync.add_room(room).await
    }

    pub async fn update_room(&self, room: Room) -> Result<Room> {
        self.sync.update_room(room).await
    }

    pub async fn remove_room(&self, id: &str) -> Result<()> {
        self.sync.remove_room(id).await
    }

    pub async fn add_schedule(&self, schedule: Schedule) -> Result<Schedule> {
        self.sync.add_schedule(schedule).await
    }

    pub async fn update_schedule(&self, schedule: Schedule) -> Result<Schedule> {
        self.sync.update_schedule(schedule).await
    }

    pub async fn toggle_schedule(&self, id: &str) -> Result<Schedule> {
        self.sync.toggle_schedule(id).await
    }

    pub async fn remove_schedule(&self, id: &str) -> Result<()> {
        self.sync.remove_schedule(id).await
    }

    // --- Lifecycle ---

    /// Stop following identity, wait for background writes, and close all
    /// replica subscriptions. Idempotent.
    pub async fn shutdown(&self) {
        self.dispatcher.settle().await;
        self.sync.close().await;
        let follower = self
            .follower
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(follower) = follower {
            follower.cancel_token.cancel();
            if let Err(e) = follower.handle.await {
                warn!("Identity follower ended abnormally: {}", e);
            }
        }
        debug!("Hub shut down");
    }
}

/// A valid URL stored under `key`, if any.
async fn persisted_url(cache: &dyn KeyValueStore, key: &str) -> Option<String> {
    match cache.get(key).await {
        Ok(Some(raw)) => match normalize_base_url(&raw) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("Ignoring stored {}: {}", key, e);
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!("Could not read {}: {}", key, e);
            None
        }
    }
}
