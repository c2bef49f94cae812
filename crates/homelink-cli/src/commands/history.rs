//! History command implementation.

use anyhow::{Result, bail};
use homelink_core::{Error, Hub};

use super::Output;
use crate::format::format_history_text;

pub async fn cmd_history(hub: &Hub, limit: Option<usize>, out: &Output) -> Result<()> {
    let entries = match hub.history(limit).await {
        Ok(entries) => entries,
        Err(Error::Unauthenticated) => {
            bail!("History is only kept for signed-in users; pass --replica-url and --uid")
        }
        Err(e) => return Err(e.into()),
    };
    let devices = hub.state().devices().snapshot();
    out.emit(&entries, |opts| {
        format_history_text(&entries, &devices, opts)
    })
}
