//! Background expiry sweep for pending invocations.
//!
//! A pending invocation carries a deadline; once it passes, the
//! invocation can no longer be confirmed. Confirm flips a lapsed row
//! to expired when someone touches it, and the sweeper catches the
//! rest, so abandoned confirmations do not sit pending forever.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::engine::ActionEngine;

/// Background task that expires lapsed pending invocations.
pub struct ExpirySweeper {
    engine: Arc<ActionEngine>,
    shutdown: Arc<Notify>,
}

impl ExpirySweeper {
    pub fn new(engine: Arc<ActionEngine>) -> Self {
        Self {
            engine,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Run the sweep loop until shutdown is signalled.
    ///
    /// Sweeps once per interval. A failed sweep is logged and the loop
    /// keeps going; the next tick retries.
    pub async fn run(&self) {
        let interval = Duration::from_secs(
            self.engine.config().confirmation.sweep_interval_seconds,
        );
        loop {
            if let Err(e) = self.engine.expire_stale() {
                tracing::warn!(error = %e, "Expiry sweep failed");
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = self.shutdown.notified() => return,
            }
        }
    }

    /// Signal the sweep loop to stop after the current sweep.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}
