//! Cooperative stop signal for a search run.
//!
//! A [`ShutdownCoordinator`] is created by the caller (the binary wires it to
//! Ctrl+C) and handed to the orchestrator explicitly. The engine checks it
//! between windows and between the pages of a window, and races every long
//! wait against it, so a stop request never interrupts a page while its items
//! are being recorded. A window stopped part-way is put back on the queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Shared handle to a shutdown coordinator.
pub type SharedShutdown = Arc<ShutdownCoordinator>;

/// Outcome of a shutdown-aware sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sleep {
    /// The full duration elapsed
    Completed,
    /// A stop was requested before the duration elapsed
    Interrupted,
}

/// Coordinates graceful shutdown across async tasks.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    is_shutdown: AtomicBool,
    notify: Notify,
}

impl ShutdownCoordinator {
    /// Create a new coordinator.
    pub fn new() -> Self {
        Self {
            is_shutdown: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Create a new shared coordinator wrapped in [`Arc`].
    pub fn shared() -> SharedShutdown {
        Arc::new(Self::new())
    }

    /// Request shutdown. Notifies all registered waiters exactly once.
    pub fn request_shutdown(&self) {
        if !self.is_shutdown.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.is_shutdown.load(Ordering::SeqCst)
    }

    /// Wait until shutdown is requested. Returns immediately if already set.
    pub async fn wait_for_shutdown(&self) {
        // Register interest before checking the flag so a request landing in
        // between is not missed.
        let notified = self.notify.notified();
        if self.is_shutdown_requested() {
            return;
        }
        notified.await;
    }
}

/// Sleep for `duration` unless `shutdown` fires first.
///
/// With no coordinator attached this is a plain sleep.
pub async fn sleep_or_shutdown(duration: Duration, shutdown: Option<&ShutdownCoordinator>) -> Sleep {
    match shutdown {
        Some(shutdown) => {
            if shutdown.is_shutdown_requested() {
                return Sleep::Interrupted;
            }
            tokio::select! {
                _ = tokio::time::sleep(duration) => Sleep::Completed,
                _ = shutdown.wait_for_shutdown() => Sleep::Interrupted,
            }
        }
        None => {
            tokio::time::sleep(duration).await;
            Sleep::Completed
        }
    }
}
