//! Fixed-window admission counter.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::error::{DocketError, Result};

/// Granularity at which a request ceiling applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    /// Per-millisecond rate limiting
    Millisecond,
    /// Per-second rate limiting
    Second,
    /// Per-minute rate limiting
    Minute,
    /// Per-hour rate limiting
    Hour,
    /// Per-day rate limiting
    Day,
}

impl TimeWindow {
    /// Get the duration of this time window.
    pub fn duration(&self) -> Duration {
        match self {
            TimeWindow::Millisecond => Duration::from_millis(1),
            TimeWindow::Second => Duration::from_secs(1),
            TimeWindow::Minute => Duration::from_secs(60),
            TimeWindow::Hour => Duration::from_secs(3600),
            TimeWindow::Day => Duration::from_secs(86400),
        }
    }
}

/// A request ceiling over a window length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    window: Duration,
    ceiling: u32,
}

impl RateLimit {
    /// Create a limit of `ceiling` requests per `window`.
    pub fn new(window: Duration, ceiling: u32) -> Result<Self> {
        if ceiling == 0 {
            return Err(DocketError::Config(
                "request ceiling must be at least 1".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(DocketError::Config(
                "rate limit window must not be empty".to_string(),
            ));
        }
        Ok(Self { window, ceiling })
    }

    /// Create a limit of `ceiling` requests per unit of time.
    pub fn per(unit: TimeWindow, ceiling: u32) -> Result<Self> {
        Self::new(unit.duration(), ceiling)
    }

    /// Length of one window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Maximum admissions per window.
    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }
}

/// Result of a single admission check against a [`RateWindow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request was counted against the current window.
    Admit {
        /// Start of the window the request was admitted into
        window_start: Instant,
        /// Count after this admission (1-based)
        position: u32,
    },
    /// The window is saturated; check again after this long.
    Wait(Duration),
}

/// Counter state for one fixed window.
///
/// This is plain data with no synchronization. Callers own it behind a lock
/// and pass the current instant explicitly, which keeps every transition
/// deterministic.
#[derive(Debug, Clone)]
pub struct RateWindow {
    limit: RateLimit,
    count: u32,
    window_start: Instant,
}

impl RateWindow {
    /// Create a window that starts at `now`.
    pub fn new(limit: RateLimit, now: Instant) -> Self {
        Self {
            limit,
            count: 0,
            window_start: now,
        }
    }

    /// Try to admit one request at `now`.
    ///
    /// An elapsed window is reset before saturation is evaluated, so a
    /// returned wait is always non-zero.
    pub fn try_admit(&mut self, now: Instant) -> Decision {
        self.maybe_reset_window(now);

        if self.count >= self.limit.ceiling {
            return Decision::Wait(self.duration_until_reset(now));
        }

        self.count += 1;
        Decision::Admit {
            window_start: self.window_start,
            position: self.count,
        }
    }

    /// Admissions counted in the current window as of `now`.
    pub fn current_count(&self, now: Instant) -> u32 {
        if self.is_elapsed(now) {
            0
        } else {
            self.count
        }
    }

    /// Admissions still available in the current window as of `now`.
    pub fn remaining(&self, now: Instant) -> u32 {
        self.limit.ceiling - self.current_count(now)
    }

    /// Time left until the current window ends.
    pub fn duration_until_reset(&self, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.window_start);
        self.limit.window.saturating_sub(elapsed)
    }

    /// Start of the current window.
    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    /// The limit this window enforces.
    pub fn limit(&self) -> RateLimit {
        self.limit
    }

    fn is_elapsed(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) >= self.limit.window
    }

    /// Reset the window if it has expired.
    fn maybe_reset_window(&mut self, now: Instant) {
        if self.is_elapsed(now) {
            self.count = 0;
            self.window_start = now;
        }
    }
}
