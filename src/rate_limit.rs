use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

type HostSlot = Arc<AsyncMutex<Option<Instant>>>;

/// The `RateLimiter` enforces a minimum spacing between requests to the same host.
///
/// Each host gets its own async mutex holding the instant of its last granted
/// turn. Tokio mutexes are fair, so callers waiting on the same host are served
/// in arrival order while different hosts never wait on each other.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    hosts: Mutex<HashMap<String, HostSlot>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// Waits until `host` may be contacted again and records the new turn.
    ///
    /// Never fails, only delays.
    ///
    /// # Arguments
    ///
    /// * `host` - The host about to be contacted, compared case-insensitively.
    pub async fn await_turn(&self, host: &str) {
        let slot = self.slot(host);
        let mut last = slot.lock().await;

        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            let wait = ready_at.saturating_duration_since(Instant::now());
            if !wait.is_zero() {
                trace!(host, wait_ms = wait.as_millis() as u64, "Waiting for rate limit");
                sleep_until(ready_at).await;
            }
        }

        *last = Some(Instant::now());
    }

    fn slot(&self, host: &str) -> HostSlot {
        // The map only ever grows, a poisoned lock still holds a usable map.
        let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        hosts
            .entry(host.to_ascii_lowercase())
            .or_insert_with(|| Arc::new(AsyncMutex::new(None)))
            .clone()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(crate::DEFAULT_MIN_INTERVAL)
    }
}
