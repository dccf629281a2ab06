//! Poll interval state machine with exponential backoff.
//!
//! The interval doubles after every failed acquisition, up to a ceiling,
//! and snaps back to the default after a success.

use std::time::Duration;
use tracing::{debug, warn};

/// Interval after one more failure: `min(2w, ceiling)`.
pub fn next_interval(current: Duration, ceiling: Duration) -> Duration {
    current.saturating_mul(2).min(ceiling)
}

/// Current poll interval of the scheduler.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Interval after a successful acquisition
    default: Duration,
    /// Maximum interval
    ceiling: Duration,
    current: Duration,
}

impl Backoff {
    /// Start at `default`, never exceeding `ceiling`.
    pub fn new(default: Duration, ceiling: Duration) -> Self {
        Self {
            default,
            ceiling,
            current: default.min(ceiling),
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    /// Record a successful acquisition. Returns the new interval.
    pub fn on_success(&mut self) -> Duration {
        self.current = self.default.min(self.ceiling);
        self.current
    }

    /// Record a failed acquisition. Returns the new interval.
    pub fn on_failure(&mut self) -> Duration {
        self.current = next_interval(self.current, self.ceiling);
        self.current
    }
}

/// State tracker for repeated failures that should not flood the log.
///
/// The coordinator being unreachable produces the same error every poll;
/// the first few are logged, the rest are suppressed until a success.
#[derive(Debug, Default)]
pub struct FailureTracker {
    consecutive_failures: u32,
    max_logged_failures: u32,
    suppressed: bool,
}

impl FailureTracker {
    /// Create a new failure tracker.
    pub fn new(max_logged_failures: u32) -> Self {
        Self {
            consecutive_failures: 0,
            max_logged_failures,
            suppressed: false,
        }
    }

    /// Record a successful operation (resets failure count).
    pub fn record_success(&mut self) {
        if self.consecutive_failures > 0 && self.suppressed {
            debug!(
                "Coordinator reachable again after {} consecutive failures",
                self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
        self.suppressed = false;
    }

    /// Record a failed operation.
    ///
    /// Returns `true` if this failure should be logged (not suppressed).
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        if self.consecutive_failures <= self.max_logged_failures {
            true
        } else if self.consecutive_failures == self.max_logged_failures + 1 {
            self.suppressed = true;
            warn!(
                "Suppressing further coordinator failure logs after {} consecutive failures",
                self.max_logged_failures
            );
            false
        } else {
            false
        }
    }

    /// Get the current consecutive failure count.
    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures
    }
}
