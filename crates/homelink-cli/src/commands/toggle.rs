//! Toggle and health commands.

use anyhow::{Result, bail};
use homelink_core::{ConnectionStatus, Hub};
use serde::Serialize;

use super::Output;
use crate::format::{format_connection, format_power};

pub async fn cmd_toggle(hub: &Hub, device_id: &str, out: &Output) -> Result<()> {
    let name = hub
        .state()
        .device(device_id)
        .map_or_else(|| device_id.to_string(), |d| d.name);
    let outcome = hub.toggle(device_id).await;

    if out.is_json() {
        out.emit(&outcome, |_| String::new())?;
    } else if let Some(state) = outcome.state {
        out.done(format!(
            "{} is now {}",
            name,
            format_power(state, out.opts.no_color)
        ));
    }

    if !outcome.success {
        bail!(
            "Could not toggle {}: {}",
            device_id,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthReport {
    server_url: String,
    status: ConnectionStatus,
}

pub async fn cmd_health(hub: &Hub, out: &Output) -> Result<()> {
    let status = hub.check_connection().await;
    let report = HealthReport {
        server_url: hub.server_url(),
        status,
    };
    out.emit(&report, |opts| {
        format!(
            "{}  {}\n",
            report.server_url,
            format_connection(report.status, opts.no_color)
        )
    })
}
