//! Output formatting utilities for text and JSON output.

use anyhow::Result;
use homelink_core::{
    CollectionKind, ConnectionStatus, Device, HistoryEntry, HubEvent, Room, Schedule, types,
};
use owo_colors::OwoColorize;
use serde::Serialize;
use time::OffsetDateTime;

/// Formatting options for output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Disable colored output.
    pub no_color: bool,
    /// Use compact JSON output (no pretty-printing).
    pub compact: bool,
}

impl FormatOptions {
    pub fn new(no_color: bool) -> Self {
        Self {
            no_color,
            compact: false,
        }
    }

    /// Create with compact JSON option.
    pub fn with_compact(mut self, compact: bool) -> Self {
        self.compact = compact;
        self
    }

    /// Serialize value to JSON string, respecting compact option.
    pub fn as_json<T: Serialize>(&self, value: &T) -> Result<String> {
        let json = if self.compact {
            serde_json::to_string(value)?
        } else {
            serde_json::to_string_pretty(value)?
        };
        Ok(json + "\n")
    }
}

/// Format controller reachability with color
#[must_use]
pub fn format_connection(status: ConnectionStatus, no_color: bool) -> String {
    let label = match status {
        ConnectionStatus::Connected => "CONNECTED",
        ConnectionStatus::Connecting => "CONNECTING",
        ConnectionStatus::Disconnected => "DISCONNECTED",
    };

    if no_color {
        format!("[{}]", label)
    } else {
        match status {
            ConnectionStatus::Connected => format!("[{}]", label.green()),
            ConnectionStatus::Connecting => format!("[{}]", label.yellow()),
            ConnectionStatus::Disconnected => format!("[{}]", label.red()),
        }
    }
}

/// Format an on/off state with color
#[must_use]
pub fn format_power(is_on: bool, no_color: bool) -> String {
    let label = if is_on { "ON" } else { "OFF" };
    if no_color {
        label.to_string()
    } else if is_on {
        label.green().bold().to_string()
    } else {
        label.dimmed().to_string()
    }
}

/// Format epoch millis as a UTC timestamp.
#[must_use]
pub fn format_timestamp(millis: i64) -> String {
    let nanos = i128::from(millis) * 1_000_000;
    match OffsetDateTime::from_unix_timestamp_nanos(nanos) {
        Ok(dt) => format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            dt.year(),
            u8::from(dt.month()),
            dt.day(),
            dt.hour(),
            dt.minute(),
            dt.second()
        ),
        Err(_) => "-".to_string(),
    }
}

fn dim(s: &str, no_color: bool) -> String {
    if no_color {
        s.to_string()
    } else {
        s.dimmed().to_string()
    }
}

// ============================================================================
// Devices
// ============================================================================

#[must_use]
pub fn format_devices_text(devices: &[Device], rooms: &[Room], opts: &FormatOptions) -> String {
    if devices.is_empty() {
        return "No devices.\n".to_string();
    }

    let name_width = devices.iter().map(|d| d.name.chars().count()).max().unwrap_or(0);
    let mut out = String::new();
    for device in devices {
        let padding = name_width.saturating_sub(device.name.chars().count());
        let brightness = if device.device_type.supports_brightness() {
            format!("  {:>3}%", device.brightness)
        } else {
            String::new()
        };
        out.push_str(&format!(
            "{}{}  {:<3}{}  {:<8} {}  {}\n",
            device.name,
            " ".repeat(padding),
            format_power(device.is_on, opts.no_color),
            brightness,
            device.device_type.to_string(),
            types::room_label(device, rooms),
            dim(&format!("({})", device.id), opts.no_color),
        ));
    }
    out
}

#[must_use]
pub fn format_device_text(device: &Device, rooms: &[Room], opts: &FormatOptions) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} ({})\n", device.name, device.id));
    out.push_str(&format!("  Type:       {}\n", device.device_type));
    out.push_str(&format!("  Room:       {}\n", types::room_label(device, rooms)));
    out.push_str(&format!(
        "  State:      {}\n",
        format_power(device.is_on, opts.no_color)
    ));
    if device.device_type.supports_brightness() {
        out.push_str(&format!("  Brightness: {}%\n", device.brightness));
    }
    out.push_str(&format!(
        "  Online:     {}\n",
        if device.is_online { "yes" } else { "no" }
    ));
    out.push_str(&format!(
        "  Updated:    {}\n",
        format_timestamp(device.last_updated)
    ));
    out
}

// ============================================================================
// Rooms
// ============================================================================

#[must_use]
pub fn format_rooms_text(rooms: &[Room], devices: &[Device], opts: &FormatOptions) -> String {
    if rooms.is_empty() {
        return "No rooms.\n".to_string();
    }

    let mut out = String::new();
    for room in rooms {
        let count = devices
            .iter()
            .filter(|d| d.room.as_deref() == Some(room.id.as_str()))
            .count();
        out.push_str(&format!(
            "{}  {} device{}  {}\n",
            room.name,
            count,
            if count == 1 { "" } else { "s" },
            dim(&format!("({})", room.id), opts.no_color),
        ));
    }
    out
}

// ============================================================================
// Schedules
// ============================================================================

fn format_repeat(schedule: &Schedule) -> String {
    if schedule.is_recurring() {
        schedule
            .repeat_days
            .iter()
            .map(|d| d.as_str())
            .collect::<Vec<_>>()
            .join(",")
    } else {
        "once".to_string()
    }
}

#[must_use]
pub fn format_schedules_text(
    schedules: &[Schedule],
    devices: &[Device],
    opts: &FormatOptions,
) -> String {
    if schedules.is_empty() {
        return "No schedules.\n".to_string();
    }

    let mut out = String::new();
    for schedule in schedules {
        let device = devices
            .iter()
            .find(|d| d.id == schedule.device_id)
            .map_or(schedule.device_id.as_str(), |d| d.name.as_str());
        let enabled = if schedule.is_enabled {
            String::new()
        } else {
            format!("  {}", dim("[disabled]", opts.no_color))
        };
        out.push_str(&format!(
            "{}  {:<3}  {}  {}{}  {}\n",
            schedule.time,
            schedule.action.as_str(),
            device,
            format_repeat(schedule),
            enabled,
            dim(&format!("({})", schedule.id), opts.no_color),
        ));
    }
    out
}

// ============================================================================
// History
// ============================================================================

#[must_use]
pub fn format_history_text(
    entries: &[HistoryEntry],
    devices: &[Device],
    opts: &FormatOptions,
) -> String {
    if entries.is_empty() {
        return "No history.\n".to_string();
    }

    let mut out = String::new();
    for entry in entries {
        let device = devices
            .iter()
            .find(|d| d.id == entry.device_id)
            .map_or(entry.device_id.as_str(), |d| d.name.as_str());
        out.push_str(&format!(
            "{}  {}  {}\n",
            dim(&format_timestamp(entry.timestamp), opts.no_color),
            format_power(entry.action.is_on(), opts.no_color),
            device,
        ));
    }
    out
}

// ============================================================================
// Events
// ============================================================================

/// One line per event for `watch`.
#[must_use]
pub fn format_event_line(event: &HubEvent, opts: &FormatOptions) -> String {
    match event {
        HubEvent::ConnectionChanged { from, to } => format!(
            "connection {} -> {}",
            from,
            format_connection(*to, opts.no_color)
        ),
        HubEvent::DeviceToggled { device_id, is_on } => format!(
            "{} toggled {}",
            device_id,
            format_power(*is_on, opts.no_color)
        ),
        HubEvent::ToggleFailed { device_id, error } => {
            let label = if opts.no_color {
                "failed".to_string()
            } else {
                "failed".red().to_string()
            };
            format!("{} toggle {}: {}", device_id, label, error)
        }
        HubEvent::CollectionReplaced { kind, origin, len } => {
            let noun = match kind {
                CollectionKind::Devices => "devices",
                CollectionKind::Rooms => "rooms",
                CollectionKind::Schedules => "schedules",
            };
            format!("{} {} loaded from {:?}", len, noun, origin).to_lowercase()
        }
        HubEvent::RemoteWriteFailed { path, error } => {
            format!("remote write to {} failed: {}", path, error)
        }
        HubEvent::SessionChanged { uid: Some(uid) } => format!("signed in as {}", uid),
        HubEvent::SessionChanged { uid: None } => "signed out".to_string(),
        HubEvent::HistoryRecorded { device_id, action } => {
            format!("history: {} {}", device_id, action)
        }
        other => format!("{:?}", other),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use homelink_core::{DeviceType, Origin, ScheduleAction, ScheduleTime, Weekday};

    fn plain() -> FormatOptions {
        FormatOptions::new(true)
    }

    // ========================================================================
    // status tests
    // ========================================================================

    #[test]
    fn test_format_connection_no_color() {
        assert_eq!(
            format_connection(ConnectionStatus::Connected, true),
            "[CONNECTED]"
        );
        assert_eq!(
            format_connection(ConnectionStatus::Disconnected, true),
            "[DISCONNECTED]"
        );
    }

    #[test]
    fn test_format_connection_with_color_contains_label() {
        let result = format_connection(ConnectionStatus::Connecting, false);
        assert!(result.contains("CONNECTING"));
        assert_ne!(result, "[CONNECTING]");
    }

    #[test]
    fn test_format_power() {
        assert_eq!(format_power(true, true), "ON");
        assert_eq!(format_power(false, true), "OFF");
        assert!(format_power(true, false).contains("ON"));
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00");
        assert_eq!(format_timestamp(1_700_000_000_000), "2023-11-14 22:13:20");
        assert_eq!(format_timestamp(i64::MAX), "-");
    }

    #[test]
    fn test_as_json_compact() {
        let opts = plain().with_compact(true);
        assert_eq!(opts.as_json(&vec![1, 2]).unwrap(), "[1,2]\n");
        assert_eq!(plain().as_json(&1).unwrap(), "1\n");
    }

    // ========================================================================
    // listing tests
    // ========================================================================

    #[test]
    fn test_format_devices_text() {
        let rooms = vec![Room::new("living", "Living Room", "sofa", "#fff")];
        let mut lamp = Device::new("led-1", "Lamp", DeviceType::Light).in_room("living");
        lamp.is_on = true;
        lamp.brightness = 40;
        let plug = Device::new("plug-1", "Coffee", DeviceType::Switch);

        let out = format_devices_text(&[lamp, plug], &rooms, &plain());
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Lamp    ON"));
        assert!(lines[0].contains("40%"));
        assert!(lines[0].contains("Living Room"));
        assert!(lines[0].ends_with("(led-1)"));
        assert!(lines[1].contains("OFF"));
        assert!(!lines[1].contains('%'));
        assert!(lines[1].contains(types::UNCATEGORIZED));
    }

    #[test]
    fn test_format_empty_listings() {
        assert_eq!(format_devices_text(&[], &[], &plain()), "No devices.\n");
        assert_eq!(format_rooms_text(&[], &[], &plain()), "No rooms.\n");
        assert_eq!(format_schedules_text(&[], &[], &plain()), "No schedules.\n");
        assert_eq!(format_history_text(&[], &[], &plain()), "No history.\n");
    }

    #[test]
    fn test_format_rooms_counts_devices() {
        let rooms = vec![Room::new("kitchen", "Kitchen", "pot", "#000")];
        let devices = vec![
            Device::new("a", "A", DeviceType::Light).in_room("kitchen"),
            Device::new("b", "B", DeviceType::Light).in_room("kitchen"),
        ];
        let out = format_rooms_text(&rooms, &devices, &plain());
        assert_eq!(out, "Kitchen  2 devices  (kitchen)\n");
    }

    #[test]
    fn test_format_schedules_text() {
        let devices = vec![Device::new("led-1", "Lamp", DeviceType::Light)];
        let mut weekly = Schedule::new(
            "led-1",
            ScheduleTime::new(6, 30).unwrap(),
            ScheduleAction::On,
        )
        .repeat_on([Weekday::Fri, Weekday::Mon]);
        weekly.id = "s1".into();
        let mut once = Schedule::new(
            "gone",
            ScheduleTime::new(22, 0).unwrap(),
            ScheduleAction::Off,
        );
        once.id = "s2".into();
        once.is_enabled = false;

        let out = format_schedules_text(&[weekly, once], &devices, &plain());
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines[0], "06:30  ON   Lamp  Mon,Fri  (s1)");
        assert_eq!(lines[1], "22:00  OFF  gone  once  [disabled]  (s2)");
    }

    #[test]
    fn test_format_history_uses_device_names() {
        let devices = vec![Device::new("led-1", "Lamp", DeviceType::Light)];
        let entries = vec![HistoryEntry {
            id: "-k1".into(),
            device_id: "led-1".into(),
            action: ScheduleAction::Off,
            timestamp: 0,
        }];
        let out = format_history_text(&entries, &devices, &plain());
        assert_eq!(out, "1970-01-01 00:00:00  OFF  Lamp\n");
    }

    #[test]
    fn test_format_event_lines() {
        let opts = plain();
        assert_eq!(
            format_event_line(
                &HubEvent::DeviceToggled {
                    device_id: "led-1".into(),
                    is_on: true
                },
                &opts
            ),
            "led-1 toggled ON"
        );
        assert_eq!(
            format_event_line(
                &HubEvent::CollectionReplaced {
                    kind: CollectionKind::Rooms,
                    origin: Origin::Defaults,
                    len: 3
                },
                &opts
            ),
            "3 rooms loaded from defaults"
        );
        assert_eq!(
            format_event_line(&HubEvent::SessionChanged { uid: None }, &opts),
            "signed out"
        );
    }
}
