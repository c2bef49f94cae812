//! Device toggle command dispatch.
//!
//! A toggle flips a device's `isOn` by commanding the physical controller:
//!
//! 1. Claim the client-wide toggle slot or fail with [`Error::Busy`]
//! 2. Resolve the device or fail with [`Error::NotFound`]
//! 3. Send the negated state, bounded per attempt and retried per
//!    [`RetryConfig::for_toggle`]
//! 4. On success, update the store, persist to the cache, and in the
//!    background mirror the new state and record history
//!
//! A failed toggle never marks the link `disconnected`; only
//! [`crate::ConnectionMonitor`] does that.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use homelink_types::{ConnectionStatus, ScheduleAction};

use crate::error::{Error, Result};
use crate::events::{CollectionKind, EventDispatcher, HubEvent};
use crate::history::HistoryRecorder;
use crate::monitor::set_status;
use crate::retry::{RetryConfig, with_retry};
use crate::state::EntityStore;
use crate::sync::SyncEngine;
use crate::traits::{Controller, LedState};

/// Default bound on one command attempt.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(8);

/// Sends toggle commands and applies their results.
pub struct CommandDispatcher {
    controller: Arc<dyn Controller>,
    state: Arc<EntityStore>,
    sync: Arc<SyncEngine>,
    history: HistoryRecorder,
    events: EventDispatcher,
    retry: RetryConfig,
    command_timeout: Duration,
    background: TaskTracker,
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("controller", &self.controller.base_url())
            .field("retry", &self.retry)
            .field("command_timeout", &self.command_timeout)
            .field("background", &self.background.len())
            .finish()
    }
}

impl CommandDispatcher {
    pub fn new(
        controller: Arc<dyn Controller>,
        state: Arc<EntityStore>,
        sync: Arc<SyncEngine>,
        history: HistoryRecorder,
        events: EventDispatcher,
    ) -> Self {
        Self {
            controller,
            state,
            sync,
            history,
            events,
            retry: RetryConfig::for_toggle(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            background: TaskTracker::new(),
        }
    }

    /// Retry policy for the physical command.
    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Bound on each command attempt.
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Flip a device. Returns the new `isOn` value.
    pub async fn toggle(&self, device_id: &str) -> Result<bool> {
        let Some(_flight) = self.state.toggle_flight().try_acquire() else {
            debug!("Toggle of {} rejected, another toggle is in flight", device_id);
            return Err(Error::Busy);
        };

        let device = self
            .state
            .device(device_id)
            .ok_or_else(|| Error::device_not_found(device_id))?;
        let target = !device.is_on;
        let command = LedState::from_on(target);
        debug!("Toggling {} to {}", device_id, command);

        let result = with_retry(&self.retry, "toggle", || self.send(command)).await;
        if let Err(e) = result {
            self.events.send(HubEvent::ToggleFailed {
                device_id: device_id.to_string(),
                error: e.to_string(),
            });
            return Err(e);
        }

        let Some(updated) = self.state.update_device(device_id, |d| {
            d.is_on = target;
            d.is_online = true;
        }) else {
            // Removed while the command was in flight.
            warn!("Device {} disappeared during toggle", device_id);
            return Err(Error::device_not_found(device_id));
        };
        info!("Device {} is now {}", device_id, command);

        self.sync.persist(CollectionKind::Devices).await;

        if self.sync.is_authenticated() {
            let sync = Arc::clone(&self.sync);
            let history = self.history.clone();
            self.background.spawn(async move {
                sync.mirror_device_state(&updated).await;
                if let Err(e) = history
                    .record(&updated.id, ScheduleAction::from_state(target))
                    .await
                {
                    warn!("Could not record history for {}: {}", updated.id, e);
                }
            });
        }

        set_status(&self.state, &self.events, ConnectionStatus::Connected);
        self.events.send(HubEvent::DeviceToggled {
            device_id: device_id.to_string(),
            is_on: target,
        });
        Ok(target)
    }

    async fn send(&self, command: LedState) -> Result<()> {
        match timeout(self.command_timeout, self.controller.send_state(command)).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout("POST /led", self.command_timeout)),
        }
    }

    /// Wait for background mirror and history writes started so far.
    pub async fn settle(&self) {
        self.background.close();
        self.background.wait().await;
        self.background.reopen();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockController;
    use crate::replica::MemoryReplica;
    use homelink_store::{MemoryStore, keys, load_json};
    use homelink_types::Device;

    struct Fixture {
        controller: Arc<MockController>,
        state: Arc<EntityStore>,
        cache: Arc<MemoryStore>,
        replica: Arc<MemoryReplica>,
        sync: Arc<SyncEngine>,
        dispatcher: CommandDispatcher,
        events: EventDispatcher,
    }

    async fn fixture() -> Fixture {
        let controller = Arc::new(MockController::new());
        let state = Arc::new(EntityStore::new());
        let cache = Arc::new(MemoryStore::new());
        let replica = Arc::new(MemoryReplica::new());
        let events = EventDispatcher::default();
        let sync = Arc::new(SyncEngine::new(
            state.clone(),
            cache.clone(),
            replica.clone(),
            events.clone(),
        ));
        sync.load_local().await;
        let history = HistoryRecorder::new(replica.clone(), sync.session(), events.clone());
        let dispatcher = CommandDispatcher::new(
            controller.clone(),
            state.clone(),
            sync.clone(),
            history,
            events.clone(),
        );
        Fixture {
            controller,
            state,
            cache,
            replica,
            sync,
            dispatcher,
            events,
        }
    }

    /// Attach as `u1` and wait until the default device is seeded remotely.
    async fn attach_seeded(f: &Fixture) {
        f.sync.attach("u1").await.unwrap();
        for _ in 0..200 {
            if f.replica.peek("devices/u1/led-1").is_object() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("remote devices were not seeded");
    }

    #[tokio::test]
    async fn test_toggle_flips_and_persists() {
        let f = fixture().await;
        let before = f.state.device("led-1").unwrap();
        assert!(!before.is_on);

        assert!(f.dispatcher.toggle("led-1").await.unwrap());
        let after = f.state.device("led-1").unwrap();
        assert!(after.is_on);
        assert!(after.last_updated > before.last_updated);
        assert_eq!(f.controller.led(), Some(LedState::On));
        assert_eq!(f.state.connection_status(), ConnectionStatus::Connected);

        let cached: Vec<Device> = load_json(f.cache.as_ref(), keys::DEVICES)
            .await
            .unwrap()
            .unwrap();
        assert!(cached[0].is_on);

        assert!(!f.dispatcher.toggle("led-1").await.unwrap());
        assert_eq!(f.controller.led(), Some(LedState::Off));
    }

    #[tokio::test]
    async fn test_unknown_device_never_reaches_controller() {
        let f = fixture().await;
        let err = f.dispatcher.toggle("ghost").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "Device", .. }));
        assert_eq!(f.controller.attempt_count(), 0);
        assert!(!f.state.is_toggling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_leave_state_alone() {
        let f = fixture().await;
        f.controller.set_should_fail(true);
        f.state.set_connection_status(ConnectionStatus::Connected);
        let mut events = f.events.subscribe();

        let err = f.dispatcher.toggle("led-1").await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
        assert_eq!(f.controller.attempt_count(), 3);
        assert!(!f.state.device("led-1").unwrap().is_on);
        assert_eq!(f.state.connection_status(), ConnectionStatus::Connected);
        assert!(!f.state.is_toggling());

        assert_eq!(
            events.recv().await.unwrap(),
            HubEvent::ToggleFailed {
                device_id: "led-1".into(),
                error: err.to_string(),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_is_retried() {
        let f = fixture().await;
        f.controller.set_latency(Duration::from_secs(20));
        let started = tokio::time::Instant::now();

        let err = f.dispatcher.toggle("led-1").await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert_eq!(f.controller.attempt_count(), 3);
        // 3 bounded attempts plus 2 pauses.
        let expected = DEFAULT_COMMAND_TIMEOUT * 3 + Duration::from_millis(1000);
        assert!(started.elapsed() >= expected);
        assert!(started.elapsed() < expected + Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_authenticated_toggle_mirrors_and_records() {
        let f = fixture().await;
        attach_seeded(&f).await;

        f.dispatcher.toggle("led-1").await.unwrap();
        f.dispatcher.settle().await;

        assert_eq!(
            f.replica.peek("devices/u1/led-1/isOn"),
            serde_json::Value::Bool(true)
        );
        let history = f.replica.peek("deviceHistory/u1");
        let entries = history.as_object().unwrap();
        assert_eq!(entries.len(), 1);
        let entry = entries.values().next().unwrap();
        assert_eq!(entry["deviceId"], "led-1");
        assert_eq!(entry["action"], "ON");
    }

    #[tokio::test]
    async fn test_mirror_failure_does_not_fail_toggle() {
        let f = fixture().await;
        attach_seeded(&f).await;
        f.replica.set_fail_writes(true);

        assert!(f.dispatcher.toggle("led-1").await.unwrap());
        f.dispatcher.settle().await;
        assert!(f.state.device("led-1").unwrap().is_on);
    }
}
