//! Sliding-window failure tracking per endpoint.
//!
//! Each endpoint gets a fixed window of `window_secs` that resets wholesale
//! once it has aged out. Only 5xx responses and unhandled errors count as
//! failures; 4xx (429 included) are client problems, not server degradation.
//!
//! # Locking
//! ```text
//! windows: Mutex<LruCache<endpoint, Arc<Mutex<EndpointWindow>>>>
//!            │ held only to find/create/evict an entry
//!            ▼
//!          Mutex<EndpointWindow>   held for the read-modify-write
//! ```
//! Unrelated endpoints never contend beyond the brief map lookup.

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::admission::protected::is_protected;
use crate::config::TrackerConfig;
use crate::observability::metrics;

/// Counters for one endpoint's current window.
#[derive(Debug)]
struct EndpointWindow {
    total: u64,
    failed: u64,
    window_start: Instant,
    last_access: Instant,
}

impl EndpointWindow {
    fn new(now: Instant) -> Self {
        Self {
            total: 0,
            failed: 0,
            window_start: now,
            last_access: now,
        }
    }

    fn is_expired(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.window_start) >= window
    }

    /// Reset the counters if the window has aged out.
    fn roll(&mut self, now: Instant, window: Duration) {
        if self.is_expired(now, window) {
            self.clear(now);
        }
    }

    fn clear(&mut self, now: Instant) {
        self.total = 0;
        self.failed = 0;
        self.window_start = now;
    }

    fn rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failed as f64 / self.total as f64
        }
    }
}

/// Diagnostic view of one endpoint's window.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EndpointRate {
    pub failure_rate: f64,
    pub total: u64,
    pub failed: u64,
    pub idle_secs: f64,
}

/// Bounded set of per-endpoint failure windows.
pub struct FailureTracker {
    windows: Mutex<LruCache<String, Arc<Mutex<EndpointWindow>>>>,
    window: Duration,
}

impl FailureTracker {
    pub fn new(config: &TrackerConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_endpoints).unwrap_or(NonZeroUsize::MIN);
        Self {
            windows: Mutex::new(LruCache::new(capacity)),
            window: config.window(),
        }
    }

    /// Record a completed request. Failure iff `status >= 500`.
    pub fn record(&self, endpoint: &str, status: u16) {
        self.observe(endpoint, status >= 500);
    }

    /// Record a request that ended without a status (error, panic, cancellation).
    pub fn record_exception(&self, endpoint: &str) {
        self.observe(endpoint, true);
    }

    /// Failure rate in the current window, `0.0` when unknown or empty.
    pub fn failure_rate(&self, endpoint: &str) -> f64 {
        self.with_current(endpoint, |w| w.rate()).unwrap_or(0.0)
    }

    /// Requests in the current window, `0` when unknown.
    pub fn request_count(&self, endpoint: &str) -> u64 {
        self.with_current(endpoint, |w| w.total).unwrap_or(0)
    }

    /// Zero an endpoint's counters without dropping its entry.
    pub fn reset_endpoint(&self, endpoint: &str) {
        if let Some(window) = self.peek(endpoint) {
            window.lock().clear(Instant::now());
        }
    }

    /// Best-effort snapshot for diagnostics; not used for control decisions.
    pub fn all_rates(&self) -> BTreeMap<String, EndpointRate> {
        let entries: Vec<_> = self
            .windows
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let now = Instant::now();
        entries
            .into_iter()
            .map(|(endpoint, window)| {
                let w = window.lock();
                let (total, failed) = if w.is_expired(now, self.window) {
                    (0, 0)
                } else {
                    (w.total, w.failed)
                };
                let rate = EndpointRate {
                    failure_rate: if total == 0 { 0.0 } else { failed as f64 / total as f64 },
                    total,
                    failed,
                    idle_secs: now.saturating_duration_since(w.last_access).as_secs_f64(),
                };
                (endpoint, rate)
            })
            .collect()
    }

    /// Number of live windows.
    pub fn len(&self) -> usize {
        self.windows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_tracked(&self, endpoint: &str) -> bool {
        self.windows.lock().contains(endpoint)
    }

    fn observe(&self, endpoint: &str, failed: bool) {
        if is_protected(endpoint) {
            return;
        }
        let now = Instant::now();
        let window = self.window_for(endpoint, now);
        let mut w = window.lock();
        w.roll(now, self.window);
        w.total += 1;
        if failed {
            w.failed += 1;
        }
        w.last_access = now;
    }

    /// Fetch or create the window, promoting it to most-recently-used.
    fn window_for(&self, endpoint: &str, now: Instant) -> Arc<Mutex<EndpointWindow>> {
        let mut windows = self.windows.lock();
        if let Some(window) = windows.get(endpoint) {
            return window.clone();
        }

        let window = Arc::new(Mutex::new(EndpointWindow::new(now)));
        if let Some((evicted, _)) = windows.push(endpoint.to_string(), window.clone()) {
            metrics::record_eviction("failure_windows");
            tracing::debug!(evicted = %evicted, "Failure window evicted (LRU)");
        }
        window
    }

    /// Lookup without touching LRU order.
    fn peek(&self, endpoint: &str) -> Option<Arc<Mutex<EndpointWindow>>> {
        if is_protected(endpoint) {
            return None;
        }
        self.windows.lock().peek(endpoint).cloned()
    }

    fn with_current<T>(&self, endpoint: &str, f: impl FnOnce(&EndpointWindow) -> T) -> Option<T> {
        let window = self.peek(endpoint)?;
        let mut w = window.lock();
        w.roll(Instant::now(), self.window);
        Some(f(&w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> FailureTracker {
        FailureTracker::new(&TrackerConfig::default())
    }

    #[test]
    fn test_rate_counts_only_server_errors() {
        let tracker = tracker();
        for status in [200, 201, 404, 429, 500, 503] {
            tracker.record("/players/123", status);
        }
        tracker.record_exception("/players/123");

        assert_eq!(tracker.request_count("/players/123"), 7);
        assert!((tracker.failure_rate("/players/123") - 3.0 / 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_client_errors_never_fail() {
        let tracker = tracker();
        for _ in 0..20 {
            tracker.record("/teams", 429);
            tracker.record("/teams", 400);
        }
        assert_eq!(tracker.failure_rate("/teams"), 0.0);
        assert_eq!(tracker.request_count("/teams"), 40);
    }

    #[test]
    fn test_unknown_endpoint_is_zero() {
        let tracker = tracker();
        assert_eq!(tracker.failure_rate("/nope"), 0.0);
        assert_eq!(tracker.request_count("/nope"), 0);
    }

    #[test]
    fn test_protected_paths_are_never_tracked() {
        let tracker = tracker();
        for path in ["/healthz", "/readyz", "/health", "/health/deps", "/vanguard/rates", "/admin/x"] {
            for _ in 0..50 {
                tracker.record(path, 500);
                tracker.record_exception(path);
            }
            assert_eq!(tracker.failure_rate(path), 0.0);
        }
        assert!(tracker.all_rates().is_empty());
        assert!(tracker.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_after_expiry() {
        let tracker = tracker();
        for _ in 0..5 {
            tracker.record("/pulse/data", 500);
        }
        assert_eq!(tracker.failure_rate("/pulse/data"), 1.0);

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(tracker.request_count("/pulse/data"), 5);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(tracker.failure_rate("/pulse/data"), 0.0);
        assert_eq!(tracker.request_count("/pulse/data"), 0);
        assert!(tracker.is_tracked("/pulse/data"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_hides_expired_counts() {
        let tracker = tracker();
        tracker.record("/a", 500);
        tokio::time::advance(Duration::from_secs(61)).await;

        let rates = tracker.all_rates();
        assert_eq!(rates["/a"].total, 0);
        assert_eq!(rates["/a"].failure_rate, 0.0);
        assert!(rates["/a"].idle_secs >= 61.0);
    }

    #[test]
    fn test_reset_keeps_identity() {
        let tracker = tracker();
        tracker.record("/matchup/analyze", 500);
        tracker.reset_endpoint("/matchup/analyze");

        assert!(tracker.is_tracked("/matchup/analyze"));
        assert_eq!(tracker.request_count("/matchup/analyze"), 0);
    }

    #[test]
    fn test_lru_bound() {
        let tracker = tracker();
        for i in 0..=200 {
            tracker.record(&format!("/e{}", i), 200);
        }
        assert_eq!(tracker.len(), 200);
        assert!(!tracker.is_tracked("/e0"));
        assert!(tracker.is_tracked("/e200"));
    }

    #[test]
    fn test_lru_evicts_least_recently_recorded() {
        let config = TrackerConfig {
            window_secs: 60,
            max_endpoints: 3,
        };
        let tracker = FailureTracker::new(&config);
        tracker.record("/a", 200);
        tracker.record("/b", 200);
        tracker.record("/c", 200);
        tracker.record("/a", 200);
        // Reads do not count as access.
        tracker.failure_rate("/b");
        tracker.record("/d", 200);

        assert!(tracker.is_tracked("/a"));
        assert!(!tracker.is_tracked("/b"));
        assert!(tracker.is_tracked("/c"));
        assert!(tracker.is_tracked("/d"));
    }

    #[test]
    fn test_concurrent_records_are_not_lost() {
        let tracker = Arc::new(tracker());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for i in 0..500 {
                        let status = if (t + i) % 2 == 0 { 500 } else { 200 };
                        tracker.record("/shared", status);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(tracker.request_count("/shared"), 4000);
        assert_eq!(tracker.failure_rate("/shared"), 0.5);
    }
}
