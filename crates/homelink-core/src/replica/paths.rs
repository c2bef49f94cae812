//! Per-user replica paths and record conversion.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::error::Result;

/// Builds the replica paths owned by one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePaths {
    uid: String,
}

impl RemotePaths {
    pub fn new(uid: impl Into<String>) -> Self {
        Self { uid: uid.into() }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn devices(&self) -> String {
        format!("devices/{}", self.uid)
    }

    pub fn device(&self, id: &str) -> String {
        format!("devices/{}/{}", self.uid, id)
    }

    pub fn rooms(&self) -> String {
        format!("rooms/{}", self.uid)
    }

    pub fn room(&self, id: &str) -> String {
        format!("rooms/{}/{}", self.uid, id)
    }

    pub fn schedules(&self) -> String {
        format!("schedules/{}", self.uid)
    }

    pub fn schedule(&self, id: &str) -> String {
        format!("schedules/{}/{}", self.uid, id)
    }

    pub fn history(&self) -> String {
        format!("deviceHistory/{}", self.uid)
    }
}

/// Decode a keyed map of records into entities, taking each id from its key.
///
/// `null` (an absent collection) decodes to an empty vector. Records that do
/// not decode are skipped with a warning so one bad entry written by another
/// client cannot hide the rest. Entities come back in key order.
pub fn decode_collection<T: DeserializeOwned>(value: &Value) -> Vec<T> {
    let entries: Vec<(String, &Value)> = match value {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        // Integer-like keys can come back as a sparse array.
        Value::Array(items) => items
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => Vec::new(),
    };

    let mut out = Vec::with_capacity(entries.len());
    for (key, record) in entries {
        let Value::Object(fields) = record else {
            warn!("Skipping non-object record at key {}", key);
            continue;
        };
        let mut fields = fields.clone();
        fields.insert("id".to_string(), Value::String(key.clone()));
        match serde_json::from_value(Value::Object(fields)) {
            Ok(item) => out.push(item),
            Err(e) => warn!("Skipping undecodable record {}: {}", key, e),
        }
    }
    out
}

/// Encode an entity as a replica record. The id is the key, so it is left
/// out of the body.
pub fn encode_record<T: Serialize>(item: &T) -> Result<Value> {
    let mut value = serde_json::to_value(item)?;
    if let Value::Object(fields) = &mut value {
        fields.remove("id");
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use homelink_types::{Device, DeviceType, Room};
    use serde_json::json;

    #[test]
    fn test_paths() {
        let paths = RemotePaths::new("u1");
        assert_eq!(paths.devices(), "devices/u1");
        assert_eq!(paths.device("led-1"), "devices/u1/led-1");
        assert_eq!(paths.room("kitchen"), "rooms/u1/kitchen");
        assert_eq!(paths.schedule("s1"), "schedules/u1/s1");
        assert_eq!(paths.history(), "deviceHistory/u1");
    }

    #[test]
    fn test_decode_takes_id_from_key() {
        let value = json!({
            "kitchen": {"name": "Kitchen", "icon": "restaurant-outline", "color": "#F59E0B"},
            "bedroom": {"id": "stale", "name": "Bed", "icon": "bed-outline", "color": "#10B981"}
        });
        let rooms: Vec<Room> = decode_collection(&value);
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].id, "bedroom");
        assert_eq!(rooms[1].id, "kitchen");
    }

    #[test]
    fn test_decode_null_and_garbage() {
        assert!(decode_collection::<Room>(&Value::Null).is_empty());
        let value = json!({"a": 5, "b": {"name": "ok", "icon": "", "color": ""}});
        let rooms: Vec<Room> = decode_collection(&value);
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].id, "b");
    }

    #[test]
    fn test_decode_sparse_array() {
        let value = json!([null, {"name": "One", "icon": "", "color": ""}]);
        let rooms: Vec<Room> = decode_collection(&value);
        assert_eq!(rooms[0].id, "1");
    }

    #[test]
    fn test_decode_keeps_device_with_odd_brightness() {
        let value = json!({
            "led-1": {"name": "Lamp", "type": "light", "brightness": 57.5},
            "fan-1": {"name": "Fan", "type": "fan", "brightness": 1024}
        });
        let devices: Vec<Device> = decode_collection(&value);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].id, "fan-1");
        assert_eq!(devices[0].brightness, 100);
        assert_eq!(devices[1].brightness, 58);
    }

    #[test]
    fn test_encode_drops_id_and_round_trips() {
        let device = Device::new("led-1", "Lamp", DeviceType::Light).in_room("kitchen");
        let record = encode_record(&device).unwrap();
        assert!(record.get("id").is_none());
        assert_eq!(record["isOn"], false);
        assert_eq!(record["type"], "light");

        let decoded: Vec<Device> = decode_collection(&json!({ "led-1": record }));
        assert_eq!(decoded, vec![device]);
    }
}
