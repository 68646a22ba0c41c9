//! Sliding-window log used by the rate limiter.
//!
//! A window is the time-ordered list of request markers (epoch
//! milliseconds) for one identifier. Backends must run [`RateWindow::hit`]
//! as one indivisible step per key: the in-memory backend holds the map
//! entry lock, the LMDB backend holds its single write transaction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cache::CacheResult;

/// Outcome of recording one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowDecision {
    pub allowed: bool,
    /// Markers in the window after this request was evaluated.
    pub count: u32,
    /// Epoch milliseconds at which the oldest marker leaves the window.
    pub reset_at_ms: i64,
}

/// Stored state of one window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateWindow {
    /// Ascending. Equal timestamps are kept as separate markers.
    pub markers: Vec<i64>,
    /// The whole window may be dropped once this instant is reached.
    pub expires_at_ms: i64,
}

impl RateWindow {
    /// Discard expired markers, count, then either reject or record `now_ms`.
    pub fn hit(&mut self, now_ms: i64, window_ms: i64, limit: u32) -> WindowDecision {
        if self.expires_at_ms <= now_ms {
            self.markers.clear();
        }
        let floor = now_ms.saturating_sub(window_ms);
        self.markers.retain(|&ts| ts > floor);

        let count = u32::try_from(self.markers.len()).unwrap_or(u32::MAX);
        if count >= limit {
            let reset_at_ms = self
                .markers
                .first()
                .map(|&oldest| oldest.saturating_add(window_ms))
                .unwrap_or_else(|| now_ms.saturating_add(window_ms));
            return WindowDecision {
                allowed: false,
                count,
                reset_at_ms,
            };
        }

        let position = self.markers.partition_point(|&ts| ts <= now_ms);
        self.markers.insert(position, now_ms);
        self.expires_at_ms = now_ms.saturating_add(window_ms);

        let oldest = self.markers.first().copied().unwrap_or(now_ms);
        WindowDecision {
            allowed: true,
            count: count + 1,
            reset_at_ms: oldest.saturating_add(window_ms),
        }
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms <= now_ms
    }
}

/// Atomic check-count-record primitive keyed by identifier.
#[async_trait]
pub trait SlidingWindowStore: Send + Sync {
    /// Evaluate one request against the window stored under
    /// `ratelimit:{key}`.
    async fn hit(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: i64,
        limit: u32,
    ) -> CacheResult<WindowDecision>;

    /// Delete every stored window whose expiry is at or before `now_ms`.
    /// Returns how many windows were removed.
    async fn purge_expired(&self, now_ms: i64) -> CacheResult<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const WINDOW: i64 = 60_000;

    #[test]
    fn test_first_hit_resets_after_full_window() {
        let mut window = RateWindow::default();
        let decision = window.hit(1_000, WINDOW, 5);
        assert!(decision.allowed);
        assert_eq!(decision.count, 1);
        assert_eq!(decision.reset_at_ms, 61_000);
        assert_eq!(window.expires_at_ms, 61_000);
    }

    #[test]
    fn test_reject_reports_oldest_expiry() {
        let mut window = RateWindow::default();
        for t in [1_000, 2_000, 3_000] {
            assert!(window.hit(t, WINDOW, 3).allowed);
        }
        let decision = window.hit(4_000, WINDOW, 3);
        assert!(!decision.allowed);
        assert_eq!(decision.count, 3);
        assert_eq!(decision.reset_at_ms, 61_000);
        // Rejected requests are not recorded.
        assert_eq!(window.markers, vec![1_000, 2_000, 3_000]);
    }

    #[test]
    fn test_marker_leaves_at_exact_window_boundary() {
        let mut window = RateWindow::default();
        assert!(window.hit(1_000, WINDOW, 1).allowed);
        assert!(!window.hit(60_999, WINDOW, 1).allowed);
        assert!(window.hit(61_000, WINDOW, 1).allowed);
    }

    #[test]
    fn test_same_millisecond_requests_count_separately() {
        let mut window = RateWindow::default();
        assert!(window.hit(5_000, WINDOW, 2).allowed);
        assert!(window.hit(5_000, WINDOW, 2).allowed);
        assert!(!window.hit(5_000, WINDOW, 2).allowed);
    }

    #[test]
    fn test_expired_window_starts_fresh() {
        let mut window = RateWindow {
            markers: vec![100, 200],
            expires_at_ms: 500,
        };
        assert!(window.is_expired(500));
        let decision = window.hit(600, 10, 2);
        assert!(decision.allowed);
        assert_eq!(window.markers, vec![600]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_limit_then_reject_then_recover(
            limit in 1u32..20,
            window_ms in 1i64..100_000,
            start in 0i64..1_000_000,
        ) {
            let mut window = RateWindow::default();
            for i in 0..limit {
                let now = start + (i as i64 * (window_ms - 1)) / limit.max(1) as i64;
                prop_assert!(window.hit(now, window_ms, limit).allowed);
            }
            let last = start + window_ms - 1;
            let rejected = window.hit(last, window_ms, limit);
            prop_assert!(!rejected.allowed);
            prop_assert_eq!(rejected.reset_at_ms, start + window_ms);

            let after = window.hit(start + window_ms, window_ms, limit);
            prop_assert!(after.allowed);
        }
    }
}
