//! Sync and command engine for a small smart-home client.
//!
//! This crate keeps a local view of devices, rooms and schedules consistent
//! with a local cache and, when a user is signed in, with a remote replica.
//! It also sends on/off commands to a network controller and tracks whether
//! that controller is reachable.
//!
//! # Features
//!
//! - **Entity state**: observable collections of devices, rooms and schedules
//! - **Sync**: offline cache with built-in defaults, live replica subscriptions
//!   when signed in, optimistic writes with best-effort remote mirroring
//! - **Commands**: single-flight device toggles with bounded, retried attempts
//! - **Reachability**: on-demand health probes
//! - **History**: bounded per-user toggle history
//!
//! # Components
//!
//! | Component | Type |
//! |-----------|------|
//! | Entity State Store | [`EntityStore`] |
//! | Synchronization Engine | [`SyncEngine`] |
//! | Command Dispatcher | [`CommandDispatcher`] |
//! | Connection Monitor | [`ConnectionMonitor`] |
//! | History Recorder | [`HistoryRecorder`] |
//! | Facade | [`Hub`] |
//!
//! Collaborators are traits so they can be swapped for tests: [`Controller`]
//! ([`HttpController`], [`MockController`]), [`ReplicaStore`]
//! ([`RestReplica`], [`MemoryReplica`]), [`IdentityProvider`]
//! ([`StaticIdentity`]) and `homelink_store::KeyValueStore`.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use homelink_core::{HttpController, Hub, HubConfig, MemoryReplica, StaticIdentity};
//! use homelink_store::Store;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HubConfig::default();
//!     let controller = HttpController::new(&config.server_url)?;
//!     let hub = Hub::start(
//!         config,
//!         Arc::new(Store::open_default()?),
//!         Arc::new(MemoryReplica::new()),
//!         Arc::new(controller),
//!         &StaticIdentity::signed_out(),
//!     )
//!     .await?;
//!
//!     println!("Controller: {:?}", hub.check_connection().await);
//!     println!("{:?}", hub.toggle("led-1").await);
//!     hub.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod guard;
pub mod history;
pub mod hub;
pub mod identity;
pub mod mock;
pub mod monitor;
pub mod replica;
pub mod retry;
pub mod state;
pub mod sync;
pub mod traits;

// Re-export the data model for convenience
pub use homelink_types as types;
pub use homelink_types::{
    AuthUser, ConnectionStatus, ConnectionTransition, Device, DeviceType, HistoryEntry, Room,
    Schedule, ScheduleAction, ScheduleTime, Weekday,
};

pub use controller::{HttpController, normalize_base_url};
pub use dispatcher::{CommandDispatcher, DEFAULT_COMMAND_TIMEOUT};
pub use error::{BUSY_MESSAGE, Error, Result};
pub use events::{CollectionKind, EventDispatcher, EventReceiver, HubEvent, Origin};
pub use guard::{FlightGuard, SingleFlight};
pub use history::{DEFAULT_HISTORY_CAP, DEFAULT_READ_WINDOW, HistoryRecorder};
pub use hub::{DEFAULT_CAMERA_URL, DEFAULT_SERVER_URL, Hub, HubConfig, ToggleOutcome};
pub use identity::{IdentityProvider, Session, StaticIdentity};
pub use mock::{Attempt, MockController};
pub use monitor::{ConnectionMonitor, DEFAULT_HEALTH_TIMEOUT};
pub use replica::{
    MemoryReplica, RemotePaths, ReplicaStore, RestReplica, Subscription, decode_collection,
    encode_record, server_timestamp,
};
pub use retry::{RetryConfig, with_retry};
pub use state::{Collection, Entity, EntityStore};
pub use sync::{MirrorWrite, SyncEngine};
pub use traits::{Controller, LedCommand, LedState};

/// Type alias for a shared hub reference.
pub type SharedHub = std::sync::Arc<Hub>;
