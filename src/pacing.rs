//! Minimum spacing between successive outbound calls.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Enforces a minimum interval between the starts of consecutive calls.
///
/// The first call goes through immediately. Each later call waits until
/// `interval` has elapsed since the previous one started.
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    last_start: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_start: Mutex::new(None),
        }
    }

    /// Wait for our slot, then record the call start.
    pub async fn wait(&self) {
        let mut last = self.last_start.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.interval;
            let now = Instant::now();
            if ready_at > now {
                debug!(wait_ms = (ready_at - now).as_millis() as u64, "Pacing outbound call");
                sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}
