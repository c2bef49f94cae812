//! Command implementations for the CLI.

mod config;
mod device;
mod history;
mod hub;
mod room;
mod schedule;
mod toggle;
mod watch;

use std::fmt::Display;

use anyhow::Result;
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::format::FormatOptions;

pub use config::cmd_config;
pub use device::{cmd_device, cmd_devices};
pub use history::cmd_history;
pub use hub::{HubOptions, OpenHub, open_hub};
pub use room::cmd_rooms;
pub use schedule::cmd_schedules;
pub use toggle::{cmd_health, cmd_toggle};
pub use watch::cmd_watch;

/// Per-invocation output settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct Output {
    pub format: OutputFormat,
    pub opts: FormatOptions,
    pub quiet: bool,
}

impl Output {
    /// Print `value` as JSON, or the text rendering produced by `text`.
    pub fn emit<T, F>(&self, value: &T, text: F) -> Result<()>
    where
        T: Serialize + ?Sized,
        F: FnOnce(&FormatOptions) -> String,
    {
        let rendered = match self.format {
            OutputFormat::Json => self.opts.as_json(&value)?,
            OutputFormat::Text => text(&self.opts),
        };
        print!("{}", rendered);
        Ok(())
    }

    /// Confirmation line for a mutation, printed in text mode unless quiet.
    pub fn done(&self, message: impl Display) {
        if !self.quiet {
            println!("{}", message);
        }
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }
}
