//! Elapsed-time ticker for the active call.
//!
//! Started exactly once per call, when the low-level connection reports
//! connected and the call status is `answered`; both conditions are required
//! because the two event sources race. Reset to zero on every teardown.

use log::debug;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

pub struct DurationClock {
    elapsed: watch::Sender<u64>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl Default for DurationClock {
    fn default() -> Self {
        Self::new()
    }
}

impl DurationClock {
    pub fn new() -> Self {
        let (elapsed, _) = watch::channel(0);
        Self {
            elapsed,
            ticker: Mutex::new(None),
        }
    }

    /// Observe the elapsed seconds. The value is non-decreasing until the
    /// next [`reset`](Self::reset).
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.elapsed.subscribe()
    }

    pub fn elapsed_secs(&self) -> u64 {
        *self.elapsed.borrow()
    }

    /// Begin ticking once per second from zero. Calling while already
    /// running is a no-op.
    pub async fn start(&self) {
        let mut ticker = self.ticker.lock().await;
        if ticker.is_some() {
            debug!(target: "Call/Clock", "Clock already running, ignoring start");
            return;
        }

        self.elapsed.send_replace(0);
        let tx = self.elapsed.clone();
        // Anchor the tick deadlines now rather than at first poll of the task.
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        *ticker = Some(tokio::spawn(async move {
            // The first tick of a fresh interval completes immediately.
            interval.tick().await;
            let mut secs = 0u64;
            loop {
                interval.tick().await;
                secs += 1;
                tx.send_replace(secs);
            }
        }));
        debug!(target: "Call/Clock", "Clock started");
    }

    /// Stop ticking and publish zero. Safe to call when not running.
    pub async fn reset(&self) {
        let mut ticker = self.ticker.lock().await;
        if let Some(handle) = ticker.take() {
            handle.abort();
            debug!(target: "Call/Clock", "Clock reset");
        }
        self.elapsed.send_replace(0);
    }
}
