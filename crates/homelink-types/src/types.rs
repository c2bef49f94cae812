//! Core types for homelink entities.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::OffsetDateTime;

use crate::error::ParseError;

/// Current wall-clock time as epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Kind of controllable appliance.
///
/// Unknown strings deserialize to [`DeviceType::Other`] so that records
/// written by newer clients still load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DeviceType {
    /// Dimmable light.
    #[default]
    Light,
    /// Plain on/off switch or plug.
    Switch,
    /// Fan with speed control.
    Fan,
    /// Read-only sensor.
    Sensor,
    /// Anything else.
    #[cfg_attr(feature = "serde", serde(other))]
    Other,
}

impl DeviceType {
    /// Whether the `brightness` field is meaningful for this type.
    #[must_use]
    pub fn supports_brightness(self) -> bool {
        matches!(self, DeviceType::Light | DeviceType::Fan)
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceType::Light => "light",
            DeviceType::Switch => "switch",
            DeviceType::Fan => "fan",
            DeviceType::Sensor => "sensor",
            DeviceType::Other => "other",
        };
        f.write_str(s)
    }
}

fn default_brightness() -> u8 {
    100
}

/// Accept any JSON number for brightness. Other clients may store fractional
/// or out-of-range values; those are rounded and clamped to 0-100 instead of
/// rejecting the whole record.
#[cfg(feature = "serde")]
fn lenient_brightness<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(match value {
        Some(v) if v.is_finite() => v.round().clamp(0.0, 100.0) as u8,
        _ => default_brightness(),
    })
}

/// A controllable appliance.
///
/// `room` is a weak reference to [`Room::id`]; it may point at a room that no
/// longer exists, in which case the device is treated as uncategorized.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Device {
    /// Stable primary key.
    #[cfg_attr(feature = "serde", serde(default))]
    pub id: String,
    /// Display name.
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: String,
    /// Appliance kind.
    #[cfg_attr(feature = "serde", serde(rename = "type", default))]
    pub device_type: DeviceType,
    /// Room id, if assigned.
    #[cfg_attr(feature = "serde", serde(default))]
    pub room: Option<String>,
    /// Whether the appliance is switched on.
    #[cfg_attr(feature = "serde", serde(default))]
    pub is_on: bool,
    /// Brightness 0-100 (only meaningful for some device types).
    #[cfg_attr(
        feature = "serde",
        serde(default = "default_brightness", deserialize_with = "lenient_brightness")
    )]
    pub brightness: u8,
    /// Locally inferred reachability.
    #[cfg_attr(feature = "serde", serde(default))]
    pub is_online: bool,
    /// Epoch millis of the last accepted mutation.
    #[cfg_attr(feature = "serde", serde(default))]
    pub last_updated: i64,
}

impl Device {
    /// Create a new device that is off, fully bright and not yet seen online.
    pub fn new(id: impl Into<String>, name: impl Into<String>, device_type: DeviceType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            device_type,
            room: None,
            is_on: false,
            brightness: 100,
            is_online: false,
            last_updated: now_millis(),
        }
    }

    /// Assign the device to a room.
    #[must_use]
    pub fn in_room(mut self, room: impl Into<String>) -> Self {
        self.room = Some(room.into());
        self
    }

    /// Stamp the device as mutated at `now`.
    ///
    /// `last_updated` never goes backwards and always advances by at least
    /// one millisecond, even if the clock stalls or steps back.
    pub fn touch(&mut self, now: i64) {
        self.last_updated = now.max(self.last_updated.saturating_add(1));
    }

    /// Set brightness, clamped to 0-100.
    pub fn set_brightness(&mut self, brightness: u8) {
        self.brightness = brightness.min(100);
    }
}

/// A named grouping of devices.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Room {
    #[cfg_attr(feature = "serde", serde(default))]
    pub id: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub icon: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub color: String,
}

impl Room {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        icon: impl Into<String>,
        color: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            icon: icon.into(),
            color: color.into(),
        }
    }
}

/// Label used for devices whose room cannot be resolved.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Resolve a device's room name, falling back to [`UNCATEGORIZED`].
#[must_use]
pub fn room_label<'a>(device: &Device, rooms: &'a [Room]) -> &'a str {
    device
        .room
        .as_deref()
        .and_then(|id| rooms.iter().find(|r| r.id == id))
        .map(|r| r.name.as_str())
        .unwrap_or(UNCATEGORIZED)
}

/// On/off action carried by schedules and history entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ScheduleAction {
    #[cfg_attr(feature = "serde", serde(rename = "ON"))]
    On,
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "OFF"))]
    Off,
}

impl ScheduleAction {
    /// Map a boolean device state to its action token.
    #[must_use]
    pub fn from_state(is_on: bool) -> Self {
        if is_on { Self::On } else { Self::Off }
    }

    /// The device state this action produces.
    #[must_use]
    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
        }
    }
}

impl fmt::Display for ScheduleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleAction {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ON" => Ok(Self::On),
            "OFF" => Ok(Self::Off),
            _ => Err(ParseError::InvalidAction(s.to_string())),
        }
    }
}

/// Day-of-week token used in `Schedule::repeat_days`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Weekday {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl Weekday {
    /// All days, Monday first.
    pub const ALL: [Weekday; 7] = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Weekday::Mon => "Mon",
            Weekday::Tue => "Tue",
            Weekday::Wed => "Wed",
            Weekday::Thu => "Thu",
            Weekday::Fri => "Fri",
            Weekday::Sat => "Sat",
            Weekday::Sun => "Sun",
        }
    }
}

impl From<time::Weekday> for Weekday {
    fn from(day: time::Weekday) -> Self {
        match day {
            time::Weekday::Monday => Weekday::Mon,
            time::Weekday::Tuesday => Weekday::Tue,
            time::Weekday::Wednesday => Weekday::Wed,
            time::Weekday::Thursday => Weekday::Thu,
            time::Weekday::Friday => Weekday::Fri,
            time::Weekday::Saturday => Weekday::Sat,
            time::Weekday::Sunday => Weekday::Sun,
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Weekday {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Weekday::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(&lower))
            .ok_or_else(|| ParseError::InvalidWeekday(s.to_string()))
    }
}

/// Wall-clock time of day in 24-hour `HH:MM` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ScheduleTime {
    hour: u8,
    minute: u8,
}

impl ScheduleTime {
    /// Build a time, rejecting out-of-range components.
    pub fn new(hour: u8, minute: u8) -> Result<Self, ParseError> {
        if hour > 23 || minute > 59 {
            return Err(ParseError::InvalidTime(format!("{hour}:{minute}")));
        }
        Ok(Self { hour, minute })
    }

    #[must_use]
    pub fn hour(self) -> u8 {
        self.hour
    }

    #[must_use]
    pub fn minute(self) -> u8 {
        self.minute
    }
}

impl From<time::Time> for ScheduleTime {
    fn from(t: time::Time) -> Self {
        Self {
            hour: t.hour(),
            minute: t.minute(),
        }
    }
}

impl fmt::Display for ScheduleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for ScheduleTime {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidTime(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(invalid());
        }
        let hour: u8 = h.parse().map_err(|_| invalid())?;
        let minute: u8 = m.parse().map_err(|_| invalid())?;
        Self::new(hour, minute).map_err(|_| invalid())
    }
}

#[cfg(feature = "serde")]
impl Serialize for ScheduleTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for ScheduleTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

fn default_enabled() -> bool {
    true
}

/// A timed on/off automation for one device.
///
/// `device_id` is a weak reference; a schedule for a removed device simply
/// never matches anything.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Schedule {
    #[cfg_attr(feature = "serde", serde(default))]
    pub id: String,
    pub device_id: String,
    pub time: ScheduleTime,
    pub action: ScheduleAction,
    /// Days to repeat on; empty means run once.
    #[cfg_attr(feature = "serde", serde(default, alias = "repeat"))]
    pub repeat_days: Vec<Weekday>,
    #[cfg_attr(feature = "serde", serde(default = "default_enabled", alias = "enabled"))]
    pub is_enabled: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub created_at: i64,
}

impl Schedule {
    pub fn new(device_id: impl Into<String>, time: ScheduleTime, action: ScheduleAction) -> Self {
        Self {
            id: String::new(),
            device_id: device_id.into(),
            time,
            action,
            repeat_days: Vec::new(),
            is_enabled: true,
            created_at: now_millis(),
        }
    }

    #[must_use]
    pub fn repeat_on(mut self, days: impl IntoIterator<Item = Weekday>) -> Self {
        self.repeat_days = days.into_iter().collect();
        self.repeat_days.sort();
        self.repeat_days.dedup();
        self
    }

    /// Whether the schedule repeats on particular days.
    #[must_use]
    pub fn is_recurring(&self) -> bool {
        !self.repeat_days.is_empty()
    }

    /// Whether the schedule should fire at `time` on `day`.
    ///
    /// One-shot schedules match on any day; de-duplicating a one-shot run is
    /// the executor's concern.
    #[must_use]
    pub fn is_due(&self, day: Weekday, time: ScheduleTime) -> bool {
        self.is_enabled
            && self.time == time
            && (self.repeat_days.is_empty() || self.repeat_days.contains(&day))
    }
}

/// One recorded device state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct HistoryEntry {
    /// Server-assigned, creation-ordered key.
    #[cfg_attr(feature = "serde", serde(default))]
    pub id: String,
    pub device_id: String,
    pub action: ScheduleAction,
    /// Server-assigned epoch millis.
    #[cfg_attr(feature = "serde", serde(default))]
    pub timestamp: i64,
}

/// Controller reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// A recorded change of [`ConnectionStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConnectionTransition {
    pub from: ConnectionStatus,
    pub to: ConnectionStatus,
    /// Epoch millis.
    pub at: i64,
}

/// Authenticated user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct AuthUser {
    pub uid: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub email: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub display_name: Option<String>,
}

impl AuthUser {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            display_name: None,
        }
    }
}
