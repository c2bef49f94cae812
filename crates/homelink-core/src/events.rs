//! Hub event system.
//!
//! Front ends subscribe here to learn about connection changes, toggles,
//! collection replacements and swallowed best-effort failures without
//! polling the entity store.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use homelink_types::{ConnectionStatus, ScheduleAction};

/// Entity collection kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Devices,
    Rooms,
    Schedules,
}

impl CollectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CollectionKind::Devices => "devices",
            CollectionKind::Rooms => "rooms",
            CollectionKind::Schedules => "schedules",
        }
    }
}

impl std::fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a collection snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// The local cache (offline load).
    Local,
    /// A push from the remote replica.
    Remote,
    /// Built-in defaults.
    Defaults,
}

/// Events emitted by the hub.
///
/// All events are serializable for logging and for the CLI's `watch` output.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum HubEvent {
    /// Controller reachability changed.
    ConnectionChanged {
        from: ConnectionStatus,
        to: ConnectionStatus,
    },
    /// A toggle reached the controller and the device state was updated.
    DeviceToggled { device_id: String, is_on: bool },
    /// A toggle exhausted its attempts.
    ToggleFailed { device_id: String, error: String },
    /// A whole entity collection was replaced.
    CollectionReplaced {
        kind: CollectionKind,
        origin: Origin,
        len: usize,
    },
    /// A best-effort remote write failed and was swallowed.
    RemoteWriteFailed { path: String, error: String },
    /// The authenticated user changed (`None` on sign-out).
    SessionChanged { uid: Option<String> },
    /// A history entry was appended.
    HistoryRecorded {
        device_id: String,
        action: ScheduleAction,
    },
}

/// Sender for hub events.
pub type EventSender = broadcast::Sender<HubEvent>;

/// Receiver for hub events.
pub type EventReceiver = broadcast::Receiver<HubEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: HubEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = HubEvent::DeviceToggled {
            device_id: "led-1".into(),
            is_on: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "device_toggled");
        assert_eq!(json["device_id"], "led-1");

        let event = HubEvent::CollectionReplaced {
            kind: CollectionKind::Rooms,
            origin: Origin::Remote,
            len: 3,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "rooms");
        assert_eq!(json["origin"], "remote");
    }

    #[tokio::test]
    async fn test_dispatcher_fan_out() {
        let dispatcher = EventDispatcher::default();
        let mut a = dispatcher.subscribe();
        let mut b = dispatcher.subscribe();
        assert_eq!(dispatcher.receiver_count(), 2);

        dispatcher.send(HubEvent::SessionChanged {
            uid: Some("u1".into()),
        });

        assert_eq!(
            a.recv().await.unwrap(),
            HubEvent::SessionChanged {
                uid: Some("u1".into())
            }
        );
        assert!(matches!(
            b.recv().await.unwrap(),
            HubEvent::SessionChanged { .. }
        ));
    }

    #[test]
    fn test_send_without_receivers_is_silent() {
        let dispatcher = EventDispatcher::new(4);
        dispatcher.send(HubEvent::SessionChanged { uid: None });
    }
}
