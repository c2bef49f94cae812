//! Controller reachability.
//!
//! [`ConnectionMonitor::check_connection`] is the only path that may set
//! [`ConnectionStatus::Disconnected`]. It runs on demand; periodic polling,
//! if wanted, is scheduled by the caller.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info};

use homelink_types::ConnectionStatus;

use crate::events::{EventDispatcher, HubEvent};
use crate::state::EntityStore;
use crate::traits::Controller;

/// Default bound on a health probe.
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Record a status change and announce it.
pub(crate) fn set_status(state: &EntityStore, events: &EventDispatcher, to: ConnectionStatus) {
    if let Some(transition) = state.set_connection_status(to) {
        events.send(HubEvent::ConnectionChanged {
            from: transition.from,
            to: transition.to,
        });
    }
}

/// Probes the controller's `/health` endpoint.
#[derive(Clone)]
pub struct ConnectionMonitor {
    controller: Arc<dyn Controller>,
    state: Arc<EntityStore>,
    events: EventDispatcher,
    timeout: Duration,
}

impl std::fmt::Debug for ConnectionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionMonitor")
            .field("controller", &self.controller.base_url())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ConnectionMonitor {
    pub fn new(
        controller: Arc<dyn Controller>,
        state: Arc<EntityStore>,
        events: EventDispatcher,
    ) -> Self {
        Self {
            controller,
            state,
            events,
            timeout: DEFAULT_HEALTH_TIMEOUT,
        }
    }

    /// Bound on each probe.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Probe the controller once.
    ///
    /// Sets `connecting`, then `connected` on a 2xx answer within the bound
    /// and `disconnected` on anything else. Returns the final status.
    pub async fn check_connection(&self) -> ConnectionStatus {
        set_status(&self.state, &self.events, ConnectionStatus::Connecting);

        let status = match timeout(self.timeout, self.controller.health()).await {
            Ok(Ok(())) => ConnectionStatus::Connected,
            Ok(Err(e)) => {
                info!("Controller {} unreachable: {}", self.controller.base_url(), e);
                ConnectionStatus::Disconnected
            }
            Err(_) => {
                info!(
                    "Controller {} did not answer within {:?}",
                    self.controller.base_url(),
                    self.timeout
                );
                ConnectionStatus::Disconnected
            }
        };
        debug!("Health probe result: {}", status);

        set_status(&self.state, &self.events, status);
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockController;

    fn monitor(controller: Arc<MockController>) -> (ConnectionMonitor, Arc<EntityStore>) {
        let state = Arc::new(EntityStore::new());
        let monitor = ConnectionMonitor::new(controller, state.clone(), EventDispatcher::default());
        (monitor, state)
    }

    #[tokio::test]
    async fn test_healthy_controller_connects() {
        let (monitor, state) = monitor(Arc::new(MockController::new()));
        assert_eq!(monitor.check_connection().await, ConnectionStatus::Connected);
        assert_eq!(state.connection_status(), ConnectionStatus::Connected);

        let steps: Vec<_> = state
            .connection_transitions()
            .into_iter()
            .map(|t| t.to)
            .collect();
        assert_eq!(
            steps,
            vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
        );
    }

    #[tokio::test]
    async fn test_failing_controller_disconnects() {
        let controller = Arc::new(MockController::new());
        controller.set_should_fail(true);
        let (monitor, state) = monitor(controller);
        state.set_connection_status(ConnectionStatus::Connected);

        assert_eq!(
            monitor.check_connection().await,
            ConnectionStatus::Disconnected
        );
        assert_eq!(state.connection_status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_controller_times_out_within_bound() {
        let controller = Arc::new(MockController::new());
        controller.set_latency(Duration::from_secs(60));
        let (monitor, state) = monitor(controller);

        let started = tokio::time::Instant::now();
        let status = monitor.check_connection().await;
        assert_eq!(status, ConnectionStatus::Disconnected);
        assert!(started.elapsed() <= DEFAULT_HEALTH_TIMEOUT + Duration::from_millis(10));
        assert_eq!(state.connection_status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_transitions_are_broadcast() {
        let state = Arc::new(EntityStore::new());
        let events = EventDispatcher::default();
        let mut rx = events.subscribe();
        let monitor =
            ConnectionMonitor::new(Arc::new(MockController::new()), state, events.clone());
        monitor.check_connection().await;

        assert_eq!(
            rx.recv().await.unwrap(),
            HubEvent::ConnectionChanged {
                from: ConnectionStatus::Disconnected,
                to: ConnectionStatus::Connecting
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            HubEvent::ConnectionChanged {
                from: ConnectionStatus::Connecting,
                to: ConnectionStatus::Connected
            }
        );
    }
}
