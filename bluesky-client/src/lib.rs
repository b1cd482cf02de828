pub mod api;
pub mod metrics;
pub mod rate_limiter;
pub mod request_queue;
pub mod retry;


pub use api::{BlueskyClient, PlatformApi};
pub use metrics::{ApiMetrics, KindMetrics, MetricsCollector};
pub use rate_limiter::{RateBudget, RateBudgets, RateLimitConfig, RateLimitStatus, WindowLimit};
pub use request_queue::{
    ApiRequest, ApiResponse, PendingRequest, QueueConfig, QueueStats, RequestPriority,
    RequestQueue,
};
pub use retry::{RetryConfig, RetryStrategy};
