//! Trait abstraction for the physical controller.
//!
//! The [`Controller`] trait abstracts over the real HTTP controller and the
//! mock used in tests, so the dispatcher and monitor can be exercised
//! without a network.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Target state sent to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LedState {
    On,
    Off,
}

impl LedState {
    pub fn from_on(is_on: bool) -> Self {
        if is_on { LedState::On } else { LedState::Off }
    }

    pub fn is_on(self) -> bool {
        matches!(self, LedState::On)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LedState::On => "ON",
            LedState::Off => "OFF",
        }
    }
}

impl std::fmt::Display for LedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `POST /led`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedCommand {
    pub state: LedState,
}

/// A device controller reachable over the local network.
///
/// Implementations perform exactly one request per call; timeouts and
/// retries are layered on top by the dispatcher and monitor.
///
/// # Example
///
/// ```ignore
/// use homelink_core::{Controller, LedState, Result};
///
/// async fn switch_on<C: Controller>(controller: &C) -> Result<()> {
///     controller.send_state(LedState::On).await
/// }
/// ```
#[async_trait]
pub trait Controller: Send + Sync {
    /// Send an on/off command. Success means a 2xx response.
    async fn send_state(&self, state: LedState) -> Result<()>;

    /// Probe reachability. Success means a 2xx response.
    async fn health(&self) -> Result<()>;

    /// Current base URL, for logging.
    fn base_url(&self) -> String;

    /// Replace the base URL. Controllers without a URL ignore this.
    fn set_base_url(&self, _url: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_led_command_wire_format() {
        let body = serde_json::to_string(&LedCommand { state: LedState::On }).unwrap();
        assert_eq!(body, r#"{"state":"ON"}"#);
        let body = serde_json::to_string(&LedCommand {
            state: LedState::from_on(false),
        })
        .unwrap();
        assert_eq!(body, r#"{"state":"OFF"}"#);
    }

    #[test]
    fn test_led_state_round_trip() {
        assert!(LedState::from_on(true).is_on());
        assert!(!LedState::Off.is_on());
        assert_eq!(LedState::On.to_string(), "ON");
    }
}
