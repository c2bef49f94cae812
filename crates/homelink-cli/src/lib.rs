//! Command-line interface for homelink smart-home devices.
//!
//! This crate provides the `homelink` binary, a thin shell over
//! [`homelink_core::Hub`] for managing devices, rooms and schedules and for
//! sending on/off commands to the network controller.
//!
//! # Features
//!
//! - **Offline first**: works against the local cache with built-in defaults
//! - **Signed-in sync**: mirrors edits to a remote replica when a user id is given
//! - **Device commands**: single-flight toggles with retries and bounded attempts
//! - **Multiple output formats**: colored text or JSON
//! - **Shell completions**: bash, zsh, fish, and PowerShell
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `health` | Probe the controller |
//! | `toggle` | Flip a device on or off |
//! | `devices` | List devices, optionally by room |
//! | `device` | Add, remove, rename, move, or dim a device |
//! | `rooms` | List, add, remove, or rename rooms |
//! | `schedules` | List, add, enable, remove, or check due schedules |
//! | `history` | Show recent toggles (signed in only) |
//! | `config` | Show or change controller and camera URLs |
//! | `watch` | Stream engine events |
//! | `completions` | Generate shell completions |
//!
//! # Configuration
//!
//! The CLI reads `~/.config/homelink/config.toml` (or platform equivalent):
//!
//! - `db`: Path to the local cache database
//! - `replica_url`, `uid`, `auth_token`: Remote replica and the user to sign in as
//! - `format`: Default output format (`text` or `json`)
//! - `no_color`: Disable colored output
//! - `command_timeout`, `health_timeout`: Timeouts in seconds
//!
//! Controller and camera URLs live in the cache database and are changed
//! with `homelink config set-server` and `homelink config set-camera`.
//!
//! # Environment Variables
//!
//! - `HOMELINK_DB`, `HOMELINK_REPLICA_URL`, `HOMELINK_UID`, `HOMELINK_AUTH_TOKEN`
//! - `NO_COLOR`: Disable colored output when set
//! - `RUST_LOG`: Log filter (logs go to stderr)
//!
//! # Examples
//!
//! List devices:
//! ```bash
//! homelink devices
//! ```
//!
//! Toggle the default light:
//! ```bash
//! homelink toggle led-1
//! ```
//!
//! Switch it on every weekday morning:
//! ```bash
//! homelink schedules add led-1 06:30 ON --repeat Mon,Tue,Wed,Thu,Fri
//! ```
//!
//! Point at a different controller:
//! ```bash
//! homelink config set-server http://192.168.1.50:8080
//! ```

// This crate is primarily a binary CLI application.
// The entry point and command implementations are in main.rs.

// Re-export core dependencies for convenience
pub use homelink_core;
pub use homelink_types;
