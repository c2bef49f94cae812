//! Mock controller implementation for testing.
//!
//! This module provides a mock controller that can be used for unit testing
//! without a physical device on the network.
//!
//! The [`MockController`] implements the [`Controller`] trait, allowing it to
//! be used interchangeably with [`crate::HttpController`].
//!
//! # Features
//!
//! - **Failure injection**: fail every request, or only the next `n`
//! - **Latency simulation**: delay each request (honours paused tokio time)
//! - **Attempt log**: every command with the instant it started
//! - **Concurrency tracking**: high-water mark of commands in flight

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::traits::{Controller, LedState};

/// One recorded `send_state` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub state: LedState,
    pub at: Instant,
}

/// A mock controller for testing.
///
/// # Example
///
/// ```
/// use homelink_core::{Controller, LedState, MockController};
///
/// #[tokio::main]
/// async fn main() {
///     let controller = MockController::new();
///     controller.set_transient_failures(1);
///
///     assert!(controller.send_state(LedState::On).await.is_err());
///     assert!(controller.send_state(LedState::On).await.is_ok());
///     assert_eq!(controller.attempts().len(), 2);
/// }
/// ```
pub struct MockController {
    base_url: RwLock<String>,
    should_fail: AtomicBool,
    fail_message: RwLock<String>,
    /// Simulated latency in milliseconds (0 = no delay).
    latency_ms: AtomicU64,
    /// Number of requests to fail before succeeding.
    remaining_failures: AtomicU32,
    attempts: Mutex<Vec<Attempt>>,
    health_checks: AtomicU32,
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
    led: Mutex<Option<LedState>>,
}

impl std::fmt::Debug for MockController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockController")
            .field("base_url", &self.base_url())
            .field("should_fail", &self.should_fail.load(Ordering::Relaxed))
            .field("attempts", &self.attempt_count())
            .finish()
    }
}

impl Default for MockController {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight counter even if the request future is dropped
/// by a timeout.
struct InFlight<'a>(&'a AtomicU32);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockController {
    /// Create a healthy mock controller with no latency.
    pub fn new() -> Self {
        Self {
            base_url: RwLock::new("http://mock.invalid".to_string()),
            should_fail: AtomicBool::new(false),
            fail_message: RwLock::new("Mock failure".to_string()),
            latency_ms: AtomicU64::new(0),
            remaining_failures: AtomicU32::new(0),
            attempts: Mutex::new(Vec::new()),
            health_checks: AtomicU32::new(0),
            in_flight: AtomicU32::new(0),
            max_in_flight: AtomicU32::new(0),
            led: Mutex::new(None),
        }
    }

    // --- Test control methods ---

    /// Make every request fail.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    /// Message carried by injected network errors.
    pub fn set_fail_message(&self, message: &str) {
        *self
            .fail_message
            .write()
            .unwrap_or_else(PoisonError::into_inner) = message.to_string();
    }

    /// Set simulated latency for every request.
    ///
    /// Set to `Duration::ZERO` to disable latency simulation.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Configure transient failures.
    ///
    /// The controller will fail the next `count` requests, then succeed.
    pub fn set_transient_failures(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    /// Commands received so far, in order.
    pub fn attempts(&self) -> Vec<Attempt> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn health_checks(&self) -> u32 {
        self.health_checks.load(Ordering::Relaxed)
    }

    /// Highest number of commands that were in flight at once.
    pub fn max_in_flight(&self) -> u32 {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Last state the controller accepted.
    pub fn led(&self) -> Option<LedState> {
        *self.led.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate(&self) -> Result<()> {
        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        // Check for transient failures first
        let transient = self
            .remaining_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();

        if transient || self.should_fail.load(Ordering::Relaxed) {
            let message = self
                .fail_message
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            Err(Error::Network(message))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Controller for MockController {
    async fn send_state(&self, state: LedState) -> Result<()> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Attempt {
                state,
                at: Instant::now(),
            });

        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        self.simulate().await?;
        *self.led.lock().unwrap_or_else(PoisonError::into_inner) = Some(state);
        Ok(())
    }

    async fn health(&self) -> Result<()> {
        self.health_checks.fetch_add(1, Ordering::Relaxed);
        self.simulate().await
    }

    fn base_url(&self) -> String {
        self.base_url
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_base_url(&self, url: &str) -> Result<()> {
        let normalized = crate::controller::normalize_base_url(url)?;
        *self
            .base_url
            .write()
            .unwrap_or_else(PoisonError::into_inner) = normalized;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transient_failures() {
        let controller = MockController::new();
        controller.set_transient_failures(2);
        assert!(controller.send_state(LedState::On).await.is_err());
        assert!(controller.health().await.is_err());
        assert!(controller.send_state(LedState::On).await.is_ok());
        assert_eq!(controller.led(), Some(LedState::On));
        assert_eq!(controller.attempt_count(), 2);
        assert_eq!(controller.health_checks(), 1);
    }

    #[tokio::test]
    async fn test_should_fail_message() {
        let controller = MockController::new();
        controller.set_should_fail(true);
        controller.set_fail_message("connection refused");
        let err = controller.send_state(LedState::Off).await.unwrap_err();
        assert_eq!(err.to_string(), "Network error: connection refused");
        assert_eq!(controller.led(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_released_on_timeout() {
        let controller = MockController::new();
        controller.set_latency(Duration::from_secs(30));
        let result = tokio::time::timeout(
            Duration::from_secs(1),
            controller.send_state(LedState::On),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(controller.max_in_flight(), 1);
        assert_eq!(controller.in_flight.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_set_base_url_validates() {
        let controller = MockController::new();
        controller.set_base_url("http://hub.local/").unwrap();
        assert_eq!(controller.base_url(), "http://hub.local");
        assert!(controller.set_base_url("hub.local").is_err());
    }
}
