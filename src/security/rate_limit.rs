//! Per-client fixed-window rate limiting for the relay.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Relay calls allowed per client per window.
pub const RATE_LIMIT: u32 = 10;

/// Window length.
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Tracked clients above which every call sweeps expired windows.
pub const MAX_TRACKED_CLIENTS: usize = 10_000;

/// Fraction of calls that opportunistically sweep expired windows.
const SWEEP_PROBABILITY: f64 = 0.01;

/// Admission check keyed by client identity.
///
/// The relay only talks to this trait so the in-memory map can be swapped
/// for a store shared between instances.
pub trait ClientRateLimiter: Send + Sync {
    /// Returns `true` if the client may make another call now.
    fn try_acquire(&self, client_id: &str) -> bool;
}

/// One client's current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub count: u32,
    pub reset_at_ms: u64,
}

impl RateWindow {
    fn fresh(now_ms: u64, window_ms: u64) -> Self {
        Self {
            count: 1,
            reset_at_ms: now_ms + window_ms,
        }
    }

    fn is_expired(&self, now_ms: u64) -> bool {
        now_ms > self.reset_at_ms
    }
}

/// Process-local limiter. Windows expire logically and are reclaimed lazily.
pub struct InMemoryRateLimiter {
    windows: DashMap<String, RateWindow>,
    limit: u32,
    window_ms: u64,
}

impl InMemoryRateLimiter {
    /// Limiter with the relay policy (10 calls per minute).
    pub fn new() -> Self {
        Self::with_policy(RATE_LIMIT, RATE_LIMIT_WINDOW)
    }

    pub fn with_policy(limit: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            limit,
            window_ms: window.as_millis() as u64,
        }
    }

    /// Admission check against an explicit clock (epoch milliseconds).
    pub fn try_acquire_at(&self, client_id: &str, now_ms: u64) -> bool {
        let tracked = self.windows.len();
        if tracked > MAX_TRACKED_CLIENTS
            || (tracked > 0 && fastrand::f64() < SWEEP_PROBABILITY)
        {
            self.sweep_expired(now_ms);
        }

        match self.windows.entry(client_id.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(RateWindow::fresh(now_ms, self.window_ms));
                true
            }
            Entry::Occupied(mut slot) => {
                let window = slot.get_mut();
                if window.is_expired(now_ms) {
                    *window = RateWindow::fresh(now_ms, self.window_ms);
                    true
                } else if window.count < self.limit {
                    window.count += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Drop every expired window. Returns how many were removed.
    pub fn sweep_expired(&self, now_ms: u64) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, w| !w.is_expired(now_ms));
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.windows.len(), "Swept expired rate windows");
        }
        removed
    }

    /// Current window for a client, expired or not.
    pub fn window(&self, client_id: &str) -> Option<RateWindow> {
        self.windows.get(client_id).map(|w| *w)
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

impl Default for InMemoryRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRateLimiter for InMemoryRateLimiter {
    fn try_acquire(&self, client_id: &str) -> bool {
        self.try_acquire_at(client_id, now_ms())
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
