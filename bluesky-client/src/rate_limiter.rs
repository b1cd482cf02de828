use reputebot_core::RateLimitSettings;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimit {
    pub max_calls: u32,
    pub window: Duration,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_calls_per_window: u32,
    pub window: Duration,
    /// Per-kind limits applied on top of the shared budget.
    pub endpoints: BTreeMap<String, WindowLimit>,
}

impl RateLimitConfig {
    /// Bluesky's documented per-account budget plus the default per-kind limits.
    pub fn bluesky() -> Self {
        Self::from(&RateLimitSettings::default())
    }

    /// Longest window any budget may make a request sit out.
    pub fn longest_window(&self) -> Duration {
        self.endpoints
            .values()
            .map(|limit| limit.window)
            .fold(self.window, Duration::max)
    }
}

impl From<&RateLimitSettings> for RateLimitConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        let endpoints = settings
            .endpoints
            .iter()
            .map(|(kind, limit)| {
                let limit = WindowLimit {
                    max_calls: limit.max_calls,
                    window: Duration::from_secs(limit.window_secs),
                };
                (kind.clone(), limit)
            })
            .collect();

        Self {
            max_calls_per_window: settings.max_calls_per_window,
            window: Duration::from_secs(settings.window_secs),
            endpoints,
        }
    }
}

/// Fixed-window call budget owned by the queue dispatcher.
///
/// Every dispatch attempt consumes one unit, retries included. The window
/// restarts on the first acquisition after it has elapsed.
#[derive(Debug)]
pub struct RateBudget {
    window_start: Instant,
    calls_made: u32,
    max_calls_per_window: u32,
    window: Duration,
}

impl RateBudget {
    pub fn new(max_calls_per_window: u32, window: Duration) -> Self {
        Self {
            window_start: Instant::now(),
            calls_made: 0,
            max_calls_per_window,
            window,
        }
    }

    /// Takes one unit, or returns how long until the next window opens.
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        let wait = self.wait_time(now);
        if wait > Duration::ZERO {
            return Err(wait);
        }
        self.consume();
        Ok(())
    }

    /// Zero when a unit is available now.
    pub fn wait_time(&mut self, now: Instant) -> Duration {
        self.roll_window(now);

        if self.calls_made < self.max_calls_per_window {
            Duration::ZERO
        } else {
            let window_end = self.window_start + self.window;
            window_end.saturating_duration_since(now)
        }
    }

    fn consume(&mut self) {
        self.calls_made += 1;
    }

    pub fn status(&self, now: Instant) -> RateLimitStatus {
        let elapsed = now.saturating_duration_since(self.window_start);
        let (calls_made, time_until_window_reset) = if elapsed >= self.window {
            (0, Duration::ZERO)
        } else {
            (self.calls_made, self.window - elapsed)
        };

        RateLimitStatus {
            calls_made,
            max_calls_per_window: self.max_calls_per_window,
            window: self.window,
            time_until_window_reset,
        }
    }

    fn roll_window(&mut self, now: Instant) {
        if now.saturating_duration_since(self.window_start) >= self.window {
            self.window_start = now;
            self.calls_made = 0;
        }
    }
}

/// The shared account budget plus one budget per limited request kind.
/// A dispatch takes a unit from both or from neither.
#[derive(Debug)]
pub struct RateBudgets {
    shared: RateBudget,
    endpoints: HashMap<String, RateBudget>,
}

impl RateBudgets {
    pub fn new(config: &RateLimitConfig) -> Self {
        let endpoints = config
            .endpoints
            .iter()
            .map(|(kind, limit)| (kind.clone(), RateBudget::new(limit.max_calls, limit.window)))
            .collect();

        Self {
            shared: RateBudget::new(config.max_calls_per_window, config.window),
            endpoints,
        }
    }

    /// Takes one unit for `kind`, or returns the longer of the two waits.
    pub fn try_acquire(&mut self, kind: &str, now: Instant) -> Result<(), Duration> {
        let shared_wait = self.shared.wait_time(now);
        let mut endpoint = self.endpoints.get_mut(kind);
        let endpoint_wait = match endpoint {
            Some(ref mut budget) => budget.wait_time(now),
            None => Duration::ZERO,
        };

        let wait = shared_wait.max(endpoint_wait);
        if wait > Duration::ZERO {
            return Err(wait);
        }

        self.shared.consume();
        if let Some(budget) = endpoint {
            budget.consume();
        }
        Ok(())
    }

    /// Books calls that were already made without asking first, such as a
    /// session refresh inside a dispatch. May push the count past the limit.
    pub fn charge_upkeep(&mut self, calls: u32, now: Instant) {
        self.shared.roll_window(now);
        self.shared.calls_made = self.shared.calls_made.saturating_add(calls);
    }

    pub fn status(&self, now: Instant) -> RateLimitStatus {
        self.shared.status(now)
    }

    pub fn endpoint_status(&self, now: Instant) -> BTreeMap<String, RateLimitStatus> {
        self.endpoints
            .iter()
            .map(|(kind, budget)| (kind.clone(), budget.status(now)))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub calls_made: u32,
    pub max_calls_per_window: u32,
    pub window: Duration,
    pub time_until_window_reset: Duration,
}

impl RateLimitStatus {
    pub fn requests_remaining_in_window(&self) -> u32 {
        self.max_calls_per_window.saturating_sub(self.calls_made)
    }

    pub fn window_utilization_percentage(&self) -> f64 {
        (self.calls_made as f64 / self.max_calls_per_window as f64) * 100.0
    }

    pub fn is_near_limit(&self) -> bool {
        self.window_utilization_percentage() > 80.0
    }
}
