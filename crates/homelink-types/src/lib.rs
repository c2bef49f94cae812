//! Platform-agnostic data model for homelink.
//!
//! This crate provides the entity types shared by the sync engine, the local
//! cache and any front end: devices, rooms, schedules, history entries and
//! the controller connection status.
//!
//! # Example
//!
//! ```
//! use homelink_types::{Device, DeviceType, Room, room_label};
//!
//! let rooms = vec![Room::new("kitchen", "Kitchen", "restaurant-outline", "#F59E0B")];
//! let lamp = Device::new("lamp-1", "Lamp", DeviceType::Light).in_room("kitchen");
//! assert_eq!(room_label(&lamp, &rooms), "Kitchen");
//! ```

pub mod defaults;
pub mod error;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use types::{
    AuthUser, ConnectionStatus, ConnectionTransition, Device, DeviceType, HistoryEntry, Room,
    Schedule, ScheduleAction, ScheduleTime, UNCATEGORIZED, Weekday, now_millis, room_label,
};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_schedule_time_parse() {
        let t: ScheduleTime = "07:30".parse().unwrap();
        assert_eq!(t.hour(), 7);
        assert_eq!(t.minute(), 30);
        assert_eq!(t.to_string(), "07:30");

        let t: ScheduleTime = "7:05".parse().unwrap();
        assert_eq!(t.to_string(), "07:05");
    }

    #[test]
    fn test_schedule_time_rejects_garbage() {
        for bad in ["24:00", "12:60", "1230", "ab:cd", "12:5", ""] {
            assert!(bad.parse::<ScheduleTime>().is_err(), "{bad} should fail");
        }
    }

    #[test]
    fn test_weekday_tokens() {
        assert_eq!("Mon".parse::<Weekday>().unwrap(), Weekday::Mon);
        assert_eq!("sun".parse::<Weekday>().unwrap(), Weekday::Sun);
        assert!("Funday".parse::<Weekday>().is_err());
    }

    #[test]
    fn test_action_tokens() {
        assert_eq!("on".parse::<ScheduleAction>().unwrap(), ScheduleAction::On);
        assert_eq!(ScheduleAction::from_state(false), ScheduleAction::Off);
        assert!(ScheduleAction::On.is_on());
        assert!("maybe".parse::<ScheduleAction>().is_err());
    }

    #[test]
    fn test_device_serde_camel_case() {
        let mut device = Device::new("led-1", "LED", DeviceType::Light).in_room("kitchen");
        device.is_on = true;
        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["isOn"], true);
        assert_eq!(json["type"], "light");
        assert_eq!(json["room"], "kitchen");
        assert!(json.get("lastUpdated").is_some());

        let back: Device = serde_json::from_value(json).unwrap();
        assert_eq!(back, device);
    }

    #[test]
    fn test_device_tolerates_missing_and_unknown_fields() {
        let json = serde_json::json!({
            "name": "Mystery",
            "type": "toaster",
            "updatedAt": 1234,
        });
        let device: Device = serde_json::from_value(json).unwrap();
        assert_eq!(device.device_type, DeviceType::Other);
        assert_eq!(device.brightness, 100);
        assert!(device.room.is_none());
    }

    #[test]
    fn test_schedule_accepts_legacy_field_names() {
        let json = serde_json::json!({
            "deviceId": "led-1",
            "time": "18:00",
            "action": "ON",
            "repeat": ["Mon", "Fri"],
            "enabled": false,
        });
        let schedule: Schedule = serde_json::from_value(json).unwrap();
        assert_eq!(schedule.repeat_days, vec![Weekday::Mon, Weekday::Fri]);
        assert!(!schedule.is_enabled);
    }

    #[test]
    fn test_schedule_is_due() {
        let at = ScheduleTime::new(18, 0).unwrap();
        let once = Schedule::new("led-1", at, ScheduleAction::On);
        assert!(once.is_due(Weekday::Wed, at));
        assert!(!once.is_due(Weekday::Wed, ScheduleTime::new(18, 1).unwrap()));

        let weekly = once.clone().repeat_on([Weekday::Mon]);
        assert!(weekly.is_due(Weekday::Mon, at));
        assert!(!weekly.is_due(Weekday::Tue, at));

        let mut disabled = weekly;
        disabled.is_enabled = false;
        assert!(!disabled.is_due(Weekday::Mon, at));
    }

    #[test]
    fn test_room_label_unresolved_is_uncategorized() {
        let rooms = defaults::rooms();
        let device = Device::new("x", "X", DeviceType::Switch).in_room("garage");
        assert_eq!(room_label(&device, &rooms), UNCATEGORIZED);

        let device = Device::new("y", "Y", DeviceType::Switch);
        assert_eq!(room_label(&device, &rooms), UNCATEGORIZED);

        let device = Device::new("z", "Z", DeviceType::Switch).in_room("kitchen");
        assert_eq!(room_label(&device, &rooms), "Nhà bếp");
    }

    #[test]
    fn test_defaults() {
        let devices = defaults::devices();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, defaults::DEFAULT_DEVICE_ID);
        assert!(!devices[0].is_on);
        assert_eq!(defaults::rooms().len(), 3);
    }

    #[test]
    fn test_device_brightness_from_other_clients() {
        let load = |brightness: serde_json::Value| -> Device {
            serde_json::from_value(serde_json::json!({
                "id": "led-1",
                "name": "LED",
                "brightness": brightness,
            }))
            .unwrap()
        };
        assert_eq!(load(serde_json::json!(42.6)).brightness, 43);
        assert_eq!(load(serde_json::json!(300)).brightness, 100);
        assert_eq!(load(serde_json::json!(-5)).brightness, 0);
        assert_eq!(load(serde_json::Value::Null).brightness, 100);
        assert!(serde_json::from_value::<Device>(serde_json::json!({"brightness": "dim"})).is_err());
    }

    #[test]
    fn test_brightness_clamped() {
        let mut device = Device::new("d", "D", DeviceType::Light);
        device.set_brightness(250);
        assert_eq!(device.brightness, 100);
    }

    proptest! {
        #[test]
        fn prop_touch_strictly_increases(start in 0i64..1_000_000, stamps in proptest::collection::vec(0i64..2_000_000, 1..50)) {
            let mut device = Device::new("d", "D", DeviceType::Light);
            device.last_updated = start;
            for now in stamps {
                let before = device.last_updated;
                device.touch(now);
                prop_assert!(device.last_updated > before);
                prop_assert!(device.last_updated >= now);
            }
        }
    }
}
