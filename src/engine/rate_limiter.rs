use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sliding-window burst guard keyed by user id.
///
/// Catches double submits and scripted bursts before they reach the quota
/// store. In-memory and per-process; the daily quota stays authoritative.
pub struct BurstGuard {
    max_events: usize,
    window: Duration,
    /// Per-user request instants inside the window, oldest first.
    buckets: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl BurstGuard {
    pub fn new(max_events: usize, window: Duration) -> Self {
        Self {
            max_events,
            window,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Record one request for `key`.
    ///
    /// Returns `Err(retry_after_secs)` when the window is full.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<(), u64> {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let bucket = buckets.entry(key.to_string()).or_default();

        while let Some(&oldest) = bucket.front() {
            if now.duration_since(oldest) >= self.window {
                bucket.pop_front();
            } else {
                break;
            }
        }

        if bucket.len() >= self.max_events {
            let oldest = bucket.front().copied().unwrap_or(now);
            let retry_after = self
                .window
                .checked_sub(now.duration_since(oldest))
                .unwrap_or(Duration::from_secs(1));
            return Err(retry_after.as_secs().max(1));
        }

        bucket.push_back(now);
        Ok(())
    }

    /// Drop buckets with no entries left in the window.
    pub fn prune(&self) {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        buckets.retain(|_, bucket| {
            bucket.retain(|t| now.duration_since(*t) < self.window);
            !bucket.is_empty()
        });
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
