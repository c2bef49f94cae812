//! Single-flight guard for command classes.
//!
//! At most one operation of a guarded class may be in progress. Concurrent
//! callers are rejected rather than queued. The returned [`FlightGuard`]
//! releases the slot when dropped, so every exit path (success, error, early
//! return, cancellation of the future) frees it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

/// A slot that admits one operation at a time.
///
/// The in-flight flag is observable through [`SingleFlight::subscribe`] so a
/// front end can disable controls while a command runs.
#[derive(Debug, Clone)]
pub struct SingleFlight {
    busy: Arc<AtomicBool>,
    observers: watch::Sender<bool>,
}

impl Default for SingleFlight {
    fn default() -> Self {
        Self::new()
    }
}

impl SingleFlight {
    pub fn new() -> Self {
        let (observers, _) = watch::channel(false);
        Self {
            busy: Arc::new(AtomicBool::new(false)),
            observers,
        }
    }

    /// Try to claim the slot. Returns `None` if another operation holds it.
    pub fn try_acquire(&self) -> Option<FlightGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        publish(&self.busy, &self.observers);
        Some(FlightGuard {
            busy: Arc::clone(&self.busy),
            observers: self.observers.clone(),
        })
    }

    /// Whether an operation currently holds the slot.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Watch the in-flight flag.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.observers.subscribe()
    }
}

/// Proof of holding a [`SingleFlight`] slot. Releases on drop.
#[derive(Debug)]
pub struct FlightGuard {
    busy: Arc<AtomicBool>,
    observers: watch::Sender<bool>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
        publish(&self.busy, &self.observers);
    }
}

/// Copy the slot state into the watch channel. The flag is re-read under the
/// channel's lock, so whichever publish runs last reflects the latest claim
/// or release.
fn publish(busy: &AtomicBool, observers: &watch::Sender<bool>) {
    observers.send_if_modified(|flag| {
        let now = busy.load(Ordering::Acquire);
        let changed = *flag != now;
        *flag = now;
        changed
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_rejected() {
        let flight = SingleFlight::new();
        let guard = flight.try_acquire().expect("first acquire");
        assert!(flight.is_busy());
        assert!(flight.try_acquire().is_none());

        drop(guard);
        assert!(!flight.is_busy());
        assert!(flight.try_acquire().is_some());
    }

    #[test]
    fn test_clones_share_slot() {
        let flight = SingleFlight::new();
        let other = flight.clone();
        let _guard = flight.try_acquire().unwrap();
        assert!(other.try_acquire().is_none());
    }

    #[tokio::test]
    async fn test_observers_see_transitions() {
        let flight = SingleFlight::new();
        let mut rx = flight.subscribe();
        assert!(!*rx.borrow());

        let guard = flight.try_acquire().unwrap();
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());

        drop(guard);
        rx.changed().await.unwrap();
        assert!(!*rx.borrow_and_update());
    }

    #[test]
    fn test_holder_always_observes_busy() {
        let flight = SingleFlight::new();
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let flight = flight.clone();
                std::thread::spawn(move || {
                    let rx = flight.subscribe();
                    for _ in 0..5_000 {
                        if let Some(guard) = flight.try_acquire() {
                            assert!(*rx.borrow(), "flag cleared while held");
                            drop(guard);
                        }
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert!(!flight.is_busy());
        assert!(!*flight.subscribe().borrow());
    }

    #[tokio::test]
    async fn test_released_when_future_dropped() {
        let flight = SingleFlight::new();
        let f = flight.clone();
        let task = tokio::spawn(async move {
            let _guard = f.try_acquire().unwrap();
            std::future::pending::<()>().await;
        });
        tokio::task::yield_now().await;
        while !flight.is_busy() {
            tokio::task::yield_now().await;
        }
        task.abort();
        let _ = task.await;
        assert!(!flight.is_busy());
    }
}
