//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use homelink_types::{DeviceType, ScheduleAction, ScheduleTime, Weekday};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    /// Parse a config-file value. Unknown values fall back to text.
    pub fn from_config(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Text,
        }
    }
}

#[derive(Parser)]
#[command(name = "homelink")]
#[command(author, version, about = "CLI for homelink smart-home devices", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Compact JSON output (no pretty-printing)
    #[arg(long, global = true)]
    pub compact: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Path to the local cache database
    #[arg(long, global = true, env = "HOMELINK_DB")]
    pub db: Option<PathBuf>,

    /// Base URL of the remote replica (enables signed-in mode with --uid)
    #[arg(long, global = true, env = "HOMELINK_REPLICA_URL")]
    pub replica_url: Option<String>,

    /// User id to sign in as
    #[arg(long, global = true, env = "HOMELINK_UID")]
    pub uid: Option<String>,

    /// Auth token for the remote replica
    #[arg(long, global = true, env = "HOMELINK_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Probe the controller's health endpoint
    Health,

    /// Flip a device on or off through the controller
    Toggle {
        /// Device id
        device: String,
    },

    /// List devices
    Devices {
        /// Only devices in this room ("none" for uncategorized)
        #[arg(short, long)]
        room: Option<String>,
    },

    /// Edit devices
    Device {
        #[command(subcommand)]
        action: DeviceAction,
    },

    /// List or edit rooms
    Rooms {
        #[command(subcommand)]
        action: Option<RoomAction>,
    },

    /// List or edit schedules
    Schedules {
        /// Only schedules for this device
        #[arg(short, long)]
        device: Option<String>,

        #[command(subcommand)]
        action: Option<ScheduleCommand>,
    },

    /// Show recent device history (signed in only)
    History {
        /// Number of entries to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show or change connection settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Print engine events until interrupted
    Watch {
        /// Probe the controller every N seconds (0 to disable)
        #[arg(short, long, default_value = "0")]
        interval: u64,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Subcommand)]
pub enum DeviceAction {
    /// Add a device
    Add {
        /// Display name
        name: String,

        /// Device kind (light, switch, fan, sensor, other)
        #[arg(short = 't', long = "type", default_value = "light", value_parser = parse_device_type)]
        kind: DeviceType,

        /// Room id
        #[arg(short, long)]
        room: Option<String>,

        /// Explicit id (generated when omitted)
        #[arg(long)]
        id: Option<String>,
    },

    /// Remove a device
    Remove { id: String },

    /// Set brightness (0-100)
    Brightness {
        id: String,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        level: u8,
    },

    /// Rename a device
    Rename { id: String, name: String },

    /// Move a device to a room, or out of any room when omitted
    Move { id: String, room: Option<String> },
}

#[derive(Debug, Subcommand)]
pub enum RoomAction {
    /// Add a room
    Add {
        name: String,

        #[arg(long, default_value = "home-outline")]
        icon: String,

        #[arg(long, default_value = "#2563EB")]
        color: String,

        /// Explicit id (generated when omitted)
        #[arg(long)]
        id: Option<String>,
    },

    /// Remove a room (its devices become uncategorized)
    Remove { id: String },

    /// Rename a room
    Rename { id: String, name: String },
}

#[derive(Debug, Subcommand)]
pub enum ScheduleCommand {
    /// Add a schedule
    Add {
        /// Device id
        device: String,

        /// Time of day, HH:MM
        time: ScheduleTime,

        /// ON or OFF
        action: ScheduleAction,

        /// Days to repeat on, e.g. Mon,Wed,Fri (omit to run once)
        #[arg(short, long, value_delimiter = ',')]
        repeat: Vec<Weekday>,
    },

    /// Enable a schedule, or disable it with --off
    Enable {
        id: String,

        #[arg(long)]
        off: bool,
    },

    /// Remove a schedule
    Remove { id: String },

    /// List schedules due at a given minute (defaults to now)
    Due {
        /// Time of day, HH:MM
        #[arg(long)]
        at: Option<ScheduleTime>,

        /// Day of week
        #[arg(long)]
        day: Option<Weekday>,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Show the effective settings
    Show,

    /// Set the controller URL and probe it
    SetServer { url: String },

    /// Set the camera stream URL
    SetCamera { url: String },

    /// Print the config file path
    Path,
}

fn parse_device_type(s: &str) -> Result<DeviceType, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "light" => Ok(DeviceType::Light),
        "switch" => Ok(DeviceType::Switch),
        "fan" => Ok(DeviceType::Fan),
        "sensor" => Ok(DeviceType::Sensor),
        "other" => Ok(DeviceType::Other),
        other => Err(format!(
            "unknown device type '{}' (expected light, switch, fan, sensor or other)",
            other
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_schedule_add() {
        let cli = Cli::try_parse_from([
            "homelink", "schedules", "add", "led-1", "06:30", "ON", "--repeat", "Mon,fri",
        ])
        .unwrap();
        let Commands::Schedules {
            action: Some(ScheduleCommand::Add {
                device,
                time,
                action,
                repeat,
            }),
            ..
        } = cli.command
        else {
            panic!("wrong command");
        };
        assert_eq!(device, "led-1");
        assert_eq!(time, ScheduleTime::new(6, 30).unwrap());
        assert_eq!(action, ScheduleAction::On);
        assert_eq!(repeat, vec![Weekday::Mon, Weekday::Fri]);
    }

    #[test]
    fn test_brightness_range() {
        assert!(Cli::try_parse_from(["homelink", "device", "brightness", "led-1", "101"]).is_err());
        assert!(Cli::try_parse_from(["homelink", "device", "brightness", "led-1", "40"]).is_ok());
    }

    #[test]
    fn test_device_type_parser() {
        assert_eq!(parse_device_type("Fan").unwrap(), DeviceType::Fan);
        assert!(parse_device_type("toaster").is_err());
    }

    #[test]
    fn test_output_format_from_config() {
        assert_eq!(OutputFormat::from_config("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::from_config("table"), OutputFormat::Text);
    }
}
