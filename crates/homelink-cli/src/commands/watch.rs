//! Watch command implementation.
//!
//! Streams hub events until Ctrl-C, optionally probing the controller on a
//! fixed interval so connection changes show up.

use std::time::Duration;

use anyhow::Result;
use homelink_core::Hub;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{MissedTickBehavior, interval};
use tracing::warn;

use super::Output;
use crate::format::{format_connection, format_event_line};

pub async fn cmd_watch(hub: &Hub, interval_secs: u64, out: &Output) -> Result<()> {
    let mut events = hub.events().subscribe();
    let mut ticker = (interval_secs > 0).then(|| {
        let mut ticker = interval(Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    if !out.is_json() && !out.quiet {
        eprintln!(
            "Watching {} ({}). Press Ctrl-C to stop.",
            hub.server_url(),
            format_connection(hub.state().connection_status(), out.opts.no_color)
        );
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = async {
                match ticker.as_mut() {
                    Some(t) => { t.tick().await; }
                    None => std::future::pending::<()>().await,
                }
            } => {
                hub.check_connection().await;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if out.is_json() {
                        println!("{}", serde_json::to_string(&event)?);
                    } else {
                        println!("{}", format_event_line(&event, &out.opts));
                    }
                }
                Err(RecvError::Lagged(n)) => warn!("Dropped {} events", n),
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}
