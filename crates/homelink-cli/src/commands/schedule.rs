//! Schedule listing and editing.

use anyhow::{Result, anyhow};
use homelink_core::{Hub, Schedule, ScheduleTime, Weekday};
use time::OffsetDateTime;

use super::Output;
use super::device::require_device;
use crate::cli::ScheduleCommand;
use crate::format::format_schedules_text;

pub async fn cmd_schedules(
    hub: &Hub,
    device: Option<&str>,
    action: Option<ScheduleCommand>,
    out: &Output,
) -> Result<()> {
    let schedule = match action {
        None => {
            let schedules = match device {
                Some(id) => hub.state().schedules_for_device(id),
                None => hub.state().schedules().snapshot(),
            };
            return print_schedules(hub, &schedules, out);
        }
        Some(ScheduleCommand::Add {
            device,
            time,
            action,
            repeat,
        }) => {
            require_device(hub, &device)?;
            let schedule = hub
                .add_schedule(Schedule::new(device, time, action).repeat_on(repeat))
                .await?;
            if !out.is_json() {
                out.done(format!(
                    "Added schedule {}: {} {} at {}",
                    schedule.id, schedule.device_id, schedule.action, schedule.time
                ));
                return Ok(());
            }
            schedule
        }
        Some(ScheduleCommand::Enable { id, off }) => {
            let current = hub
                .state()
                .schedules()
                .get(&id)
                .ok_or_else(|| anyhow!("Unknown schedule: {}", id))?;
            let schedule = if current.is_enabled == !off {
                current
            } else {
                hub.toggle_schedule(&id).await?
            };
            if !out.is_json() {
                out.done(format!(
                    "Schedule {} {}",
                    schedule.id,
                    if schedule.is_enabled {
                        "enabled"
                    } else {
                        "disabled"
                    }
                ));
                return Ok(());
            }
            schedule
        }
        Some(ScheduleCommand::Remove { id }) => {
            let schedule = hub
                .state()
                .schedules()
                .get(&id)
                .ok_or_else(|| anyhow!("Unknown schedule: {}", id))?;
            hub.remove_schedule(&id).await?;
            if !out.is_json() {
                out.done(format!("Removed schedule {}", schedule.id));
                return Ok(());
            }
            schedule
        }
        Some(ScheduleCommand::Due { at, day }) => {
            // No local-offset support, so "now" is UTC.
            let now = OffsetDateTime::now_utc();
            let time = at.unwrap_or_else(|| ScheduleTime::from(now.time()));
            let day = day.unwrap_or_else(|| Weekday::from(now.weekday()));
            let due: Vec<Schedule> = hub
                .state()
                .schedules()
                .snapshot()
                .into_iter()
                .filter(|s| device.is_none_or(|id| s.device_id == id))
                .filter(|s| s.is_due(day, time))
                .collect();
            return print_schedules(hub, &due, out);
        }
    };
    out.emit(&schedule, |_| String::new())
}

fn print_schedules(hub: &Hub, schedules: &[Schedule], out: &Output) -> Result<()> {
    let devices = hub.state().devices().snapshot();
    out.emit(schedules, |opts| {
        format_schedules_text(schedules, &devices, opts)
    })
}
