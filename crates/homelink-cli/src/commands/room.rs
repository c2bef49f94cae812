//! Room listing and editing.

use anyhow::{Result, bail};
use homelink_core::{Hub, Room};

use super::Output;
use super::device::resolve_room;
use crate::cli::RoomAction;
use crate::format::format_rooms_text;

pub async fn cmd_rooms(hub: &Hub, action: Option<RoomAction>, out: &Output) -> Result<()> {
    let room = match action {
        None => {
            let rooms = hub.state().rooms().snapshot();
            let devices = hub.state().devices().snapshot();
            return out.emit(&rooms, |opts| format_rooms_text(&rooms, &devices, opts));
        }
        Some(RoomAction::Add {
            name,
            icon,
            color,
            id,
        }) => {
            if name.trim().is_empty() {
                bail!("Room name must not be empty");
            }
            let room = hub
                .add_room(Room::new(id.unwrap_or_default(), name, icon, color))
                .await?;
            if !out.is_json() {
                out.done(format!("Added room {} ({})", room.name, room.id));
                return Ok(());
            }
            room
        }
        Some(RoomAction::Remove { id }) => {
            let room = resolve_room(hub, &id)?;
            hub.remove_room(&room.id).await?;
            if !out.is_json() {
                out.done(format!("Removed room {} ({})", room.name, room.id));
                return Ok(());
            }
            room
        }
        Some(RoomAction::Rename { id, name }) => {
            if name.trim().is_empty() {
                bail!("Room name must not be empty");
            }
            let mut room = resolve_room(hub, &id)?;
            room.name = name;
            let room = hub.update_room(room).await?;
            if !out.is_json() {
                out.done(format!("Renamed room {} to {}", room.id, room.name));
                return Ok(());
            }
            room
        }
    };
    out.emit(&room, |_| String::new())
}
