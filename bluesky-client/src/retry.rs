use reputebot_core::{CoreError, PlatformApiError, RetrySettings};
use std::time::Duration;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Dispatch attempts per request, the first one included
    pub max_attempts: u32,
    /// Base delay for throttling backoff (in milliseconds)
    pub base_delay_ms: u64,
    /// Maximum throttling delay (in milliseconds)
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Maximum jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
    /// Fixed pause after a transient failure (in milliseconds)
    pub transient_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            transient_delay_ms: 2000,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            base_delay_ms: settings.throttle_base_delay_ms,
            max_delay_ms: settings.throttle_max_delay_ms,
            backoff_multiplier: settings.backoff_multiplier,
            jitter_factor: if settings.jitter { 0.2 } else { 0.0 },
            transient_delay_ms: settings.transient_delay_ms,
        }
    }
}

impl RetryConfig {
    pub fn transient_delay(&self) -> Duration {
        Duration::from_millis(self.transient_delay_ms)
    }

    /// Longest pause between two attempts of one request.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms.max(self.transient_delay_ms))
    }
}

/// Retry strategy based on error type
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Server pushed back; exponential backoff, honoring its hint when present
    Throttled(Option<Duration>),
    /// Flaky network or server; short fixed pause
    Transient,
    /// Don't retry (for permanent failures)
    NoRetry,
}

/// Determine retry strategy based on error type
pub fn get_retry_strategy(error: &CoreError) -> RetryStrategy {
    match error {
        CoreError::Platform(platform_error) => match platform_error {
            PlatformApiError::RateLimitExceeded { retry_after } => {
                RetryStrategy::Throttled(retry_after.map(Duration::from_secs))
            }
            PlatformApiError::ServerError { .. } => RetryStrategy::Transient,
            PlatformApiError::RequestTimeout => RetryStrategy::Transient,
            PlatformApiError::EndpointUnavailable { .. } => RetryStrategy::Transient,
            // A malformed payload will not fix itself on a second read
            PlatformApiError::InvalidResponse { .. } => RetryStrategy::NoRetry,
            PlatformApiError::AuthenticationFailed { .. } => RetryStrategy::NoRetry,
            PlatformApiError::InvalidToken => RetryStrategy::NoRetry,
            PlatformApiError::Forbidden { .. } => RetryStrategy::NoRetry,
            PlatformApiError::ActorNotFound { .. } => RetryStrategy::NoRetry,
            PlatformApiError::PostNotFound { .. } => RetryStrategy::NoRetry,
            PlatformApiError::BadRequest { .. } => RetryStrategy::NoRetry,
        },
        CoreError::Network(reqwest_error) => {
            if reqwest_error.is_timeout() || reqwest_error.is_connect() {
                RetryStrategy::Transient
            } else {
                RetryStrategy::NoRetry
            }
        }
        CoreError::Timeout { .. } => RetryStrategy::Transient,
        _ => RetryStrategy::NoRetry,
    }
}

/// Calculate delay with exponential backoff and jitter
pub fn calculate_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base_delay = Duration::from_millis(config.base_delay_ms);
    let max_delay = Duration::from_millis(config.max_delay_ms);

    let exponential_delay = if attempt == 0 {
        base_delay
    } else {
        let multiplier = config.backoff_multiplier.powi(attempt as i32);
        let delay_ms = (config.base_delay_ms as f64 * multiplier) as u64;
        Duration::from_millis(delay_ms.min(config.max_delay_ms))
    };

    let jitter_range = (exponential_delay.as_millis() as f64 * config.jitter_factor) as u64;
    let jitter = fastrand::u64(0..=jitter_range);
    let final_delay = exponential_delay + Duration::from_millis(jitter);

    final_delay.min(max_delay)
}

/// Pause after the `attempt`-th throttled dispatch (zero based).
///
/// A server hint replaces the computed backoff; both are capped at `max_delay_ms`.
pub fn throttle_delay(attempt: u32, hint: Option<Duration>, config: &RetryConfig) -> Duration {
    let max_delay = Duration::from_millis(config.max_delay_ms);
    match hint {
        Some(hint) => hint.min(max_delay),
        None => calculate_delay(attempt, config),
    }
}
