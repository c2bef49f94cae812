//! Built-in collections used to seed an empty cache or an uninitialized remote.

use crate::types::{Device, DeviceType, Room, now_millis};

/// Id of the built-in LED device.
pub const DEFAULT_DEVICE_ID: &str = "led-1";

/// The single controllable light shipped with a fresh install.
#[must_use]
pub fn devices() -> Vec<Device> {
    vec![Device {
        id: DEFAULT_DEVICE_ID.to_string(),
        name: "Đèn LED".to_string(),
        device_type: DeviceType::Light,
        room: Some("living-room".to_string()),
        is_on: false,
        brightness: 100,
        is_online: true,
        last_updated: now_millis(),
    }]
}

/// Living room, bedroom and kitchen.
#[must_use]
pub fn rooms() -> Vec<Room> {
    vec![
        Room::new("living-room", "Phòng khách", "home-outline", "#2563EB"),
        Room::new("bedroom", "Phòng ngủ", "bed-outline", "#10B981"),
        Room::new("kitchen", "Nhà bếp", "restaurant-outline", "#F59E0B"),
    ]
}
