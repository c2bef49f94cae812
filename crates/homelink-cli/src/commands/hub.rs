//! Opening the engine for one CLI invocation.

use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use homelink_core::{
    AuthUser, CollectionKind, HttpController, Hub, HubConfig, MemoryReplica, ReplicaStore,
    RestReplica, StaticIdentity,
};
use homelink_store::Store;
use tracing::{debug, warn};

use crate::config::Remote;

/// How long to wait for the replica's first snapshot before falling back
/// to whatever the cache holds.
const REMOTE_SYNC_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything needed to bring up a [`Hub`].
#[derive(Debug, Clone)]
pub struct HubOptions {
    pub db: PathBuf,
    pub remote: Option<Remote>,
    pub command_timeout: Option<Duration>,
    pub health_timeout: Option<Duration>,
}

/// A running hub together with the identity it follows.
pub struct OpenHub {
    hub: Hub,
    // Kept so the signed-in session lasts as long as the hub.
    _identity: StaticIdentity,
}

impl Deref for OpenHub {
    type Target = Hub;

    fn deref(&self) -> &Hub {
        &self.hub
    }
}

impl OpenHub {
    /// Wait for background writes and close replica subscriptions.
    pub async fn close(self) {
        self.hub.shutdown().await;
    }
}

pub async fn open_hub(options: &HubOptions) -> Result<OpenHub> {
    let store = Store::open(&options.db)
        .with_context(|| format!("Failed to open cache at {}", options.db.display()))?;

    let mut config = HubConfig::default();
    if let Some(timeout) = options.command_timeout {
        config = config.command_timeout(timeout);
    }
    if let Some(timeout) = options.health_timeout {
        config = config.health_timeout(timeout);
    }
    let controller = HttpController::new(&config.server_url)?
        .command_timeout(config.command_timeout)
        .health_timeout(config.health_timeout);

    let (replica, identity): (Arc<dyn ReplicaStore>, StaticIdentity) = match &options.remote {
        Some(remote) => {
            let mut replica = RestReplica::new(&remote.url)
                .with_context(|| format!("Invalid replica URL: {}", remote.url))?;
            if let Some(token) = &remote.auth_token {
                replica = replica.auth_token(token.clone());
            }
            (
                Arc::new(replica),
                StaticIdentity::signed_in(AuthUser::new(remote.uid.clone())),
            )
        }
        None => (Arc::new(MemoryReplica::new()), StaticIdentity::signed_out()),
    };

    let hub = Hub::start(
        config,
        Arc::new(store),
        replica,
        Arc::new(controller),
        &identity,
    )
    .await?;

    if options.remote.is_some() {
        if hub.session().is_authenticated() {
            let sync = hub.sync();
            let synced = tokio::time::timeout(REMOTE_SYNC_TIMEOUT, async {
                sync.wait_synced(CollectionKind::Devices).await;
                sync.wait_synced(CollectionKind::Schedules).await;
            })
            .await;
            match synced {
                Ok(()) => debug!("Replica snapshot applied"),
                Err(_) => warn!(
                    "No replica snapshot within {:?}; showing cached data",
                    REMOTE_SYNC_TIMEOUT
                ),
            }
        } else {
            warn!("Could not reach the replica; using the local cache");
        }
    }

    Ok(OpenHub {
        hub,
        _identity: identity,
    })
}
