//! In-memory entity state.
//!
//! [`EntityStore`] owns the UI-visible snapshot of devices, rooms and
//! schedules plus the controller connection status. Every collection is
//! backed by a [`tokio::sync::watch`] channel, so each mutation notifies
//! subscribers immediately.
//!
//! Mutators are synchronous and total. They never hold a lock across an
//! `.await`, and read-modify-write happens inside a single
//! `send_modify` step, so interleaved async callers cannot lose updates.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;
use tracing::info;

use homelink_types::{
    ConnectionStatus, ConnectionTransition, Device, Room, Schedule, UNCATEGORIZED, now_millis,
};

use crate::guard::SingleFlight;

/// Number of connection transitions kept in memory.
pub const TRANSITION_LOG_CAPACITY: usize = 50;

/// An entity with a stable string id.
pub trait Entity: Clone + Send + Sync + 'static {
    fn id(&self) -> &str;
}

impl Entity for Device {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for Room {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for Schedule {
    fn id(&self) -> &str {
        &self.id
    }
}

/// An observable, id-unique collection.
#[derive(Debug)]
pub struct Collection<T> {
    tx: watch::Sender<Vec<T>>,
}

impl<T: Entity> Default for Collection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> Collection<T> {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Vec::new());
        Self { tx }
    }

    /// Replace the whole collection. Later duplicates of an id win.
    pub fn set_all(&self, items: Vec<T>) {
        let mut unique: Vec<T> = Vec::with_capacity(items.len());
        for item in items {
            match unique.iter_mut().find(|e| e.id() == item.id()) {
                Some(slot) => *slot = item,
                None => unique.push(item),
            }
        }
        self.tx.send_replace(unique);
    }

    /// Insert or replace by id.
    pub fn upsert(&self, item: T) {
        self.tx.send_modify(|items| {
            match items.iter_mut().find(|e| e.id() == item.id()) {
                Some(slot) => *slot = item,
                None => items.push(item),
            }
        });
    }

    /// Remove by id, returning the removed entity.
    pub fn remove(&self, id: &str) -> Option<T> {
        let mut removed = None;
        self.tx.send_if_modified(|items| {
            let index = items.iter().position(|e| e.id() == id);
            removed = index.map(|i| items.remove(i));
            removed.is_some()
        });
        removed
    }

    /// Apply `f` to the entity with `id` in one step, returning the result.
    pub fn modify(&self, id: &str, f: impl FnOnce(&mut T)) -> Option<T> {
        let mut updated = None;
        self.tx.send_if_modified(|items| match items.iter_mut().find(|e| e.id() == id) {
            Some(item) => {
                f(item);
                updated = Some(item.clone());
                true
            }
            None => false,
        });
        updated
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.tx.borrow().iter().find(|e| e.id() == id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tx.borrow().iter().any(|e| e.id() == id)
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.tx.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    /// Watch the collection. The receiver sees the value current at
    /// subscription time as already seen.
    pub fn subscribe(&self) -> watch::Receiver<Vec<T>> {
        self.tx.subscribe()
    }
}

/// The in-memory snapshot of every entity plus connection state.
#[derive(Debug)]
pub struct EntityStore {
    devices: Collection<Device>,
    rooms: Collection<Room>,
    schedules: Collection<Schedule>,
    connection: watch::Sender<ConnectionStatus>,
    transitions: Mutex<VecDeque<ConnectionTransition>>,
    toggle_flight: SingleFlight,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore {
    pub fn new() -> Self {
        let (connection, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            devices: Collection::new(),
            rooms: Collection::new(),
            schedules: Collection::new(),
            connection,
            transitions: Mutex::new(VecDeque::with_capacity(TRANSITION_LOG_CAPACITY)),
            toggle_flight: SingleFlight::new(),
        }
    }

    pub fn devices(&self) -> &Collection<Device> {
        &self.devices
    }

    pub fn rooms(&self) -> &Collection<Room> {
        &self.rooms
    }

    pub fn schedules(&self) -> &Collection<Schedule> {
        &self.schedules
    }

    // --- Devices ---

    pub fn device(&self, id: &str) -> Option<Device> {
        self.devices.get(id)
    }

    /// Insert or replace a device.
    ///
    /// `last_updated` is raised to at least the stored value so an accepted
    /// mutation never moves it backwards.
    pub fn upsert_device(&self, mut device: Device) {
        self.devices.tx.send_modify(|items| {
            match items.iter_mut().find(|d| d.id == device.id) {
                Some(slot) => {
                    device.last_updated = device.last_updated.max(slot.last_updated);
                    *slot = device;
                }
                None => items.push(device),
            }
        });
    }

    /// Mutate a device in place and stamp it with a strictly larger
    /// `last_updated`.
    pub fn update_device(&self, id: &str, f: impl FnOnce(&mut Device)) -> Option<Device> {
        let now = now_millis();
        self.devices.modify(id, |device| {
            f(device);
            device.touch(now);
        })
    }

    pub fn devices_in_room(&self, room_id: &str) -> Vec<Device> {
        self.devices
            .tx
            .borrow()
            .iter()
            .filter(|d| d.room.as_deref() == Some(room_id))
            .cloned()
            .collect()
    }

    /// Devices with no room, or whose room no longer exists.
    pub fn uncategorized_devices(&self) -> Vec<Device> {
        let rooms = self.rooms.tx.borrow();
        self.devices
            .tx
            .borrow()
            .iter()
            .filter(|d| match &d.room {
                Some(room) => !rooms.iter().any(|r| &r.id == room),
                None => true,
            })
            .cloned()
            .collect()
    }

    /// Name of the device's room, or [`UNCATEGORIZED`].
    pub fn room_label(&self, device_id: &str) -> String {
        let Some(device) = self.device(device_id) else {
            return UNCATEGORIZED.to_string();
        };
        homelink_types::room_label(&device, &self.rooms.tx.borrow()).to_string()
    }

    // --- Schedules ---

    pub fn schedules_for_device(&self, device_id: &str) -> Vec<Schedule> {
        self.schedules
            .tx
            .borrow()
            .iter()
            .filter(|s| s.device_id == device_id)
            .cloned()
            .collect()
    }

    // --- Connection ---

    pub fn connection_status(&self) -> ConnectionStatus {
        *self.connection.borrow()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection.subscribe()
    }

    /// Set the connection status. Returns the recorded transition, or `None`
    /// if the status did not change.
    pub fn set_connection_status(&self, to: ConnectionStatus) -> Option<ConnectionTransition> {
        let mut from = to;
        let changed = self.connection.send_if_modified(|current| {
            from = *current;
            if *current == to {
                false
            } else {
                *current = to;
                true
            }
        });
        if !changed {
            return None;
        }

        let transition = ConnectionTransition {
            from,
            to,
            at: now_millis(),
        };
        info!("Connection {} -> {}", from, to);

        let mut log = self
            .transitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if log.len() == TRANSITION_LOG_CAPACITY {
            log.pop_front();
        }
        log.push_back(transition);
        Some(transition)
    }

    /// Recorded connection transitions, oldest first.
    pub fn connection_transitions(&self) -> Vec<ConnectionTransition> {
        self.transitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    // --- Single-flight ---

    /// Guard for the device toggle command class.
    pub fn toggle_flight(&self) -> &SingleFlight {
        &self.toggle_flight
    }

    pub fn is_toggling(&self) -> bool {
        self.toggle_flight.is_busy()
    }

    pub fn subscribe_toggling(&self) -> watch::Receiver<bool> {
        self.toggle_flight.subscribe()
    }
}
