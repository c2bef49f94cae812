//! Device listing and editing.

use anyhow::{Result, anyhow, bail};
use homelink_core::{Device, Hub, Room};

use super::Output;
use crate::cli::DeviceAction;
use crate::format::{format_device_text, format_devices_text};

/// Find a room by id, or by name ignoring case.
pub(super) fn resolve_room(hub: &Hub, key: &str) -> Result<Room> {
    let rooms = hub.state().rooms().snapshot();
    rooms
        .iter()
        .find(|r| r.id == key)
        .or_else(|| rooms.iter().find(|r| r.name.eq_ignore_ascii_case(key)))
        .cloned()
        .ok_or_else(|| anyhow!("Unknown room: {}", key))
}

pub(super) fn require_device(hub: &Hub, id: &str) -> Result<Device> {
    hub.state()
        .device(id)
        .ok_or_else(|| anyhow!("Unknown device: {}", id))
}

pub async fn cmd_devices(hub: &Hub, room: Option<&str>, out: &Output) -> Result<()> {
    let state = hub.state();
    let devices = match room {
        None => state.devices().snapshot(),
        Some(key) if key.eq_ignore_ascii_case("none") => state.uncategorized_devices(),
        Some(key) => state.devices_in_room(&resolve_room(hub, key)?.id),
    };
    let rooms = state.rooms().snapshot();
    out.emit(&devices, |opts| format_devices_text(&devices, &rooms, opts))
}

pub async fn cmd_device(hub: &Hub, action: DeviceAction, out: &Output) -> Result<()> {
    let device = match action {
        DeviceAction::Add {
            name,
            kind,
            room,
            id,
        } => {
            if name.trim().is_empty() {
                bail!("Device name must not be empty");
            }
            let mut device = Device::new(id.unwrap_or_default(), name, kind);
            if let Some(room) = room {
                device = device.in_room(resolve_room(hub, &room)?.id);
            }
            let device = hub.add_device(device).await?;
            if !out.is_json() {
                out.done(format!("Added {} ({})", device.name, device.id));
                return Ok(());
            }
            device
        }
        DeviceAction::Remove { id } => {
            let device = require_device(hub, &id)?;
            hub.remove_device(&id).await?;
            if !out.is_json() {
                out.done(format!("Removed {} ({})", device.name, device.id));
                return Ok(());
            }
            device
        }
        DeviceAction::Brightness { id, level } => {
            require_device(hub, &id)?;
            hub.update_device_brightness(&id, level).await?
        }
        DeviceAction::Rename { id, name } => {
            if name.trim().is_empty() {
                bail!("Device name must not be empty");
            }
            require_device(hub, &id)?;
            hub.rename_device(&id, &name).await?
        }
        DeviceAction::Move { id, room } => {
            require_device(hub, &id)?;
            let room = room.map(|key| resolve_room(hub, &key)).transpose()?;
            hub.assign_device_room(&id, room.as_ref().map(|r| r.id.as_str()))
                .await?
        }
    };

    let rooms = hub.state().rooms().snapshot();
    out.emit(&device, |opts| format_device_text(&device, &rooms, opts))
}
