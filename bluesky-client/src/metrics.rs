use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;

/// How a single dispatch attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Succeeded,
    Throttled,
    TransientFailure,
    PermanentFailure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMetrics {
    pub total_dispatches: u64,
    pub successful_requests: u64,
    pub throttled_requests: u64,
    pub transient_failures: u64,
    pub permanent_failures: u64,
    pub average_response_time: Duration,
    pub last_request_time: Option<SystemTime>,
    pub requests_by_kind: HashMap<String, KindMetrics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindMetrics {
    pub dispatched: u64,
    pub succeeded: u64,
    pub throttled: u64,
    pub transient_failures: u64,
    pub permanent_failures: u64,
    pub total_response_time: Duration,
    pub min_response_time: Duration,
    pub max_response_time: Duration,
}

#[derive(Debug, Clone)]
pub struct RequestMetrics {
    pub kind: &'static str,
    pub response_time: Duration,
    pub outcome: DispatchOutcome,
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self {
            total_dispatches: 0,
            successful_requests: 0,
            throttled_requests: 0,
            transient_failures: 0,
            permanent_failures: 0,
            average_response_time: Duration::from_millis(0),
            last_request_time: None,
            requests_by_kind: HashMap::new(),
        }
    }
}

impl KindMetrics {
    fn new() -> Self {
        Self {
            dispatched: 0,
            succeeded: 0,
            throttled: 0,
            transient_failures: 0,
            permanent_failures: 0,
            total_response_time: Duration::from_millis(0),
            min_response_time: Duration::from_secs(u64::MAX),
            max_response_time: Duration::from_millis(0),
        }
    }

    fn update(&mut self, metrics: &RequestMetrics) {
        self.dispatched += 1;
        self.total_response_time += metrics.response_time;

        if metrics.response_time < self.min_response_time {
            self.min_response_time = metrics.response_time;
        }
        if metrics.response_time > self.max_response_time {
            self.max_response_time = metrics.response_time;
        }

        match metrics.outcome {
            DispatchOutcome::Succeeded => self.succeeded += 1,
            DispatchOutcome::Throttled => self.throttled += 1,
            DispatchOutcome::TransientFailure => self.transient_failures += 1,
            DispatchOutcome::PermanentFailure => self.permanent_failures += 1,
        }
    }

    pub fn average_response_time(&self) -> Duration {
        if self.dispatched == 0 {
            Duration::from_millis(0)
        } else {
            self.total_response_time / self.dispatched as u32
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.dispatched == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.dispatched as f64
        }
    }
}

/// Per request kind dispatch statistics for the queue.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    metrics: Arc<RwLock<ApiMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(ApiMetrics::default())),
        }
    }

    pub async fn record_request(&self, request_metrics: RequestMetrics) {
        let mut metrics = self.metrics.write().await;

        metrics.total_dispatches += 1;
        metrics.last_request_time = Some(SystemTime::now());

        match request_metrics.outcome {
            DispatchOutcome::Succeeded => metrics.successful_requests += 1,
            DispatchOutcome::Throttled => metrics.throttled_requests += 1,
            DispatchOutcome::TransientFailure => metrics.transient_failures += 1,
            DispatchOutcome::PermanentFailure => metrics.permanent_failures += 1,
        }

        let total_time = metrics.average_response_time * metrics.total_dispatches as u32
            - metrics.average_response_time
            + request_metrics.response_time;
        metrics.average_response_time = total_time / metrics.total_dispatches as u32;

        metrics
            .requests_by_kind
            .entry(request_metrics.kind.to_string())
            .or_insert_with(KindMetrics::new)
            .update(&request_metrics);
    }

    pub async fn get_metrics(&self) -> ApiMetrics {
        self.metrics.read().await.clone()
    }

}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
