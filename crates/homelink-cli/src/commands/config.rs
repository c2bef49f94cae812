//! Config command implementation.

use anyhow::Result;
use homelink_core::Hub;
use serde::Serialize;

use super::{HubOptions, Output};
use crate::cli::ConfigAction;
use crate::config::Config;
use crate::format::format_connection;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Settings {
    config_path: String,
    db: String,
    server_url: String,
    camera_url: String,
    replica_url: Option<String>,
    uid: Option<String>,
    signed_in: bool,
}

pub async fn cmd_config(
    hub: &Hub,
    options: &HubOptions,
    action: ConfigAction,
    out: &Output,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let settings = Settings {
                config_path: Config::path().display().to_string(),
                db: options.db.display().to_string(),
                server_url: hub.server_url(),
                camera_url: hub.camera_url(),
                replica_url: options.remote.as_ref().map(|r| r.url.clone()),
                uid: hub.session().uid(),
                signed_in: hub.session().is_authenticated(),
            };
            out.emit(&settings, |_| {
                let mut text = String::new();
                text.push_str(&format!("Config file: {}\n", settings.config_path));
                text.push_str(&format!("Cache:       {}\n", settings.db));
                text.push_str(&format!("Controller:  {}\n", settings.server_url));
                text.push_str(&format!("Camera:      {}\n", settings.camera_url));
                match (&settings.replica_url, &settings.uid) {
                    (Some(url), Some(uid)) => {
                        text.push_str(&format!("Replica:     {} (as {})\n", url, uid))
                    }
                    (Some(url), None) => {
                        text.push_str(&format!("Replica:     {} (unreachable)\n", url))
                    }
                    _ => text.push_str("Replica:     none (offline)\n"),
                }
                text
            })
        }
        ConfigAction::SetServer { url } => {
            let status = hub.set_server_url(&url).await?;
            if out.is_json() {
                out.emit(
                    &serde_json::json!({ "serverUrl": hub.server_url(), "status": status }),
                    |_| String::new(),
                )
            } else {
                out.done(format!(
                    "Controller URL set to {}  {}",
                    hub.server_url(),
                    format_connection(status, out.opts.no_color)
                ));
                Ok(())
            }
        }
        ConfigAction::SetCamera { url } => {
            hub.set_camera_url(&url).await?;
            if out.is_json() {
                out.emit(
                    &serde_json::json!({ "cameraUrl": hub.camera_url() }),
                    |_| String::new(),
                )
            } else {
                out.done(format!("Camera URL set to {}", hub.camera_url()));
                Ok(())
            }
        }
        ConfigAction::Path => {
            println!("{}", Config::path().display());
            Ok(())
        }
    }
}
