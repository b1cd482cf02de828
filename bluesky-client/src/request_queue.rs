use crate::api::PlatformApi;
use crate::metrics::{ApiMetrics, DispatchOutcome, MetricsCollector, RequestMetrics};
use crate::rate_limiter::{RateBudgets, RateLimitConfig, RateLimitStatus};
use crate::retry::{get_retry_strategy, throttle_delay, RetryConfig, RetryStrategy};
use chrono::{DateTime, Utc};
use reputebot_core::{
    BotConfig, CoreError, FeedPage, Notification, PlatformApiError, PostRef, Profile, ReplyRef,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, timeout_at, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Dispatch class. Replies jump ahead of reads; housekeeping goes last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RequestPriority {
    High,
    Normal,
    Low,
}

impl RequestPriority {
    const ORDER: [RequestPriority; 3] = [
        RequestPriority::High,
        RequestPriority::Normal,
        RequestPriority::Low,
    ];

    fn index(self) -> usize {
        match self {
            RequestPriority::High => 0,
            RequestPriority::Normal => 1,
            RequestPriority::Low => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ApiRequest {
    ListNotifications {
        limit: u32,
    },
    GetProfile {
        actor: String,
    },
    GetAuthorFeed {
        actor: String,
        cursor: Option<String>,
        limit: u32,
    },
    PostReply {
        reply_to: ReplyRef,
        text: String,
    },
    MarkSeen {
        seen_at: DateTime<Utc>,
    },
}

impl ApiRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiRequest::ListNotifications { .. } => "list_notifications",
            ApiRequest::GetProfile { .. } => "get_profile",
            ApiRequest::GetAuthorFeed { .. } => "get_author_feed",
            ApiRequest::PostReply { .. } => "post_reply",
            ApiRequest::MarkSeen { .. } => "mark_seen",
        }
    }

    pub fn default_priority(&self) -> RequestPriority {
        match self {
            ApiRequest::PostReply { .. } => RequestPriority::High,
            ApiRequest::MarkSeen { .. } => RequestPriority::Low,
            _ => RequestPriority::Normal,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ApiResponse {
    Notifications(Vec<Notification>),
    Profile(Profile),
    Feed(FeedPage),
    Posted(PostRef),
    Seen,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub request_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::bluesky(),
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl QueueConfig {
    /// Longest a caller waits on one request: every attempt sitting out a
    /// full rate window, running to its timeout, then pausing for a retry.
    pub fn max_wait(&self) -> Duration {
        let per_attempt =
            self.rate_limit.longest_window() + self.request_timeout + self.retry.max_delay();
        per_attempt * self.retry.max_attempts
    }
}

impl From<&BotConfig> for QueueConfig {
    fn from(config: &BotConfig) -> Self {
        Self {
            rate_limit: RateLimitConfig::from(&config.rate_limit),
            retry: RetryConfig::from(&config.retry),
            request_timeout: Duration::from_secs(config.rate_limit.request_timeout_secs),
        }
    }
}

#[derive(Debug)]
struct QueuedRequest {
    request_id: Uuid,
    request: ApiRequest,
    priority: RequestPriority,
    attempts: u32,
    queued_at: Instant,
    result_sender: oneshot::Sender<Result<ApiResponse, CoreError>>,
}

#[derive(Debug, Default)]
struct QueueState {
    classes: [VecDeque<QueuedRequest>; 3],
    closed: bool,
}

impl QueueState {
    fn pop_next(&mut self) -> Option<QueuedRequest> {
        RequestPriority::ORDER
            .iter()
            .find_map(|priority| self.classes[priority.index()].pop_front())
    }

    fn is_empty(&self) -> bool {
        self.classes.iter().all(VecDeque::is_empty)
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<QueueState>,
    wakeup: Notify,
    budget: Mutex<RateBudgets>,
    metrics: MetricsCollector,
    config: QueueConfig,
}

/// Awaitable result of an enqueued request.
#[derive(Debug)]
pub struct PendingRequest {
    pub request_id: Uuid,
    receiver: oneshot::Receiver<Result<ApiResponse, CoreError>>,
    deadline: Instant,
    max_wait: Duration,
}

impl PendingRequest {
    /// Resolves with the request's result, or `Timeout` once the queue's
    /// [`QueueConfig::max_wait`] has passed since enqueueing. A request given
    /// up on this way is dropped by the dispatcher without being sent.
    pub async fn wait(self) -> Result<ApiResponse, CoreError> {
        match timeout_at(self.deadline, self.receiver).await {
            Ok(result) => result.unwrap_or(Err(CoreError::QueueClosed)),
            Err(_) => {
                warn!(
                    "Request {} still unanswered after {:?}, giving up",
                    self.request_id, self.max_wait
                );
                Err(CoreError::Timeout {
                    seconds: self.max_wait.as_secs(),
                })
            }
        }
    }
}

/// Single-dispatcher, priority-classed, rate-budgeted queue in front of a [`PlatformApi`].
///
/// Cloning gives another handle onto the same dispatcher.
#[derive(Debug, Clone)]
pub struct RequestQueue {
    shared: Arc<Shared>,
    dispatcher: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl RequestQueue {
    /// Spawns the dispatcher task. Must be called inside a tokio runtime.
    pub fn start<A>(api: Arc<A>, config: QueueConfig) -> Self
    where
        A: PlatformApi + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            wakeup: Notify::new(),
            budget: Mutex::new(RateBudgets::new(&config.rate_limit)),
            metrics: MetricsCollector::new(),
            config,
        });

        info!(
            "Starting request queue dispatcher ({} calls per {:?}, {} per-kind limits)",
            shared.config.rate_limit.max_calls_per_window,
            shared.config.rate_limit.window,
            shared.config.rate_limit.endpoints.len()
        );
        let handle = tokio::spawn(run_dispatcher(api, shared.clone()));

        Self {
            shared,
            dispatcher: Arc::new(Mutex::new(Some(handle))),
        }
    }

    pub async fn enqueue(
        &self,
        request: ApiRequest,
        priority: RequestPriority,
    ) -> Result<PendingRequest, CoreError> {
        let request_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        let max_wait = self.shared.config.max_wait();
        let queued_at = Instant::now();

        {
            let mut state = self.shared.state.lock().await;
            if state.closed {
                return Err(CoreError::QueueClosed);
            }

            debug!(
                "Enqueued request {} ({}) with priority {:?}",
                request_id,
                request.kind(),
                priority
            );
            state.classes[priority.index()].push_back(QueuedRequest {
                request_id,
                request,
                priority,
                attempts: 0,
                queued_at,
                result_sender: tx,
            });
        }
        self.shared.wakeup.notify_one();

        Ok(PendingRequest {
            request_id,
            receiver: rx,
            deadline: queued_at + max_wait,
            max_wait,
        })
    }

    pub async fn submit(
        &self,
        request: ApiRequest,
        priority: RequestPriority,
    ) -> Result<ApiResponse, CoreError> {
        self.enqueue(request, priority).await?.wait().await
    }

    pub async fn list_notifications(&self, limit: u32) -> Result<Vec<Notification>, CoreError> {
        let request = ApiRequest::ListNotifications { limit };
        let priority = request.default_priority();
        match self.submit(request, priority).await? {
            ApiResponse::Notifications(notifications) => Ok(notifications),
            other => Err(unexpected_response("list_notifications", &other)),
        }
    }

    pub async fn fetch_profile(&self, actor: &str) -> Result<Profile, CoreError> {
        let request = ApiRequest::GetProfile {
            actor: actor.to_string(),
        };
        let priority = request.default_priority();
        match self.submit(request, priority).await? {
            ApiResponse::Profile(profile) => Ok(profile),
            other => Err(unexpected_response("get_profile", &other)),
        }
    }

    pub async fn fetch_author_feed(
        &self,
        actor: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<FeedPage, CoreError> {
        let request = ApiRequest::GetAuthorFeed {
            actor: actor.to_string(),
            cursor: cursor.map(str::to_string),
            limit,
        };
        let priority = request.default_priority();
        match self.submit(request, priority).await? {
            ApiResponse::Feed(page) => Ok(page),
            other => Err(unexpected_response("get_author_feed", &other)),
        }
    }

    pub async fn post_reply(&self, reply_to: &ReplyRef, text: &str) -> Result<PostRef, CoreError> {
        let request = ApiRequest::PostReply {
            reply_to: reply_to.clone(),
            text: text.to_string(),
        };
        let priority = request.default_priority();
        match self.submit(request, priority).await? {
            ApiResponse::Posted(post) => Ok(post),
            other => Err(unexpected_response("post_reply", &other)),
        }
    }

    pub async fn mark_seen(&self, seen_at: DateTime<Utc>) -> Result<(), CoreError> {
        let request = ApiRequest::MarkSeen { seen_at };
        let priority = request.default_priority();
        match self.submit(request, priority).await? {
            ApiResponse::Seen => Ok(()),
            other => Err(unexpected_response("mark_seen", &other)),
        }
    }

    pub async fn get_queue_stats(&self) -> QueueStats {
        let queued_by_priority = {
            let state = self.shared.state.lock().await;
            [
                state.classes[0].len(),
                state.classes[1].len(),
                state.classes[2].len(),
            ]
        };
        let (rate_limit, endpoint_limits) = {
            let budget = self.shared.budget.lock().await;
            let now = Instant::now();
            (budget.status(now), budget.endpoint_status(now))
        };

        QueueStats {
            queued_high: queued_by_priority[0],
            queued_normal: queued_by_priority[1],
            queued_low: queued_by_priority[2],
            rate_limit,
            endpoint_limits,
            metrics: self.shared.metrics.get_metrics().await,
        }
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.shared.metrics
    }

    /// Stops accepting submissions and waits for queued work to drain.
    pub async fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock().await;
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.shared.wakeup.notify_one();
        info!("Request queue closing, draining remaining requests");

        let handle = self.dispatcher.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Request queue dispatcher ended abnormally: {}", e);
            }
        }
        info!("Request queue drained");
    }
}

#[derive(Debug, Clone)]
pub struct QueueStats {
    pub queued_high: usize,
    pub queued_normal: usize,
    pub queued_low: usize,
    pub rate_limit: RateLimitStatus,
    pub endpoint_limits: BTreeMap<String, RateLimitStatus>,
    pub metrics: ApiMetrics,
}

impl QueueStats {
    pub fn total_queued(&self) -> usize {
        self.queued_high + self.queued_normal + self.queued_low
    }

    /// Request kinds whose own budget is above 80% used.
    pub fn endpoints_near_limit(&self) -> Vec<&str> {
        self.endpoint_limits
            .iter()
            .filter(|(_, status)| status.is_near_limit())
            .map(|(kind, _)| kind.as_str())
            .collect()
    }
}

fn unexpected_response(kind: &str, response: &ApiResponse) -> CoreError {
    CoreError::Internal {
        message: format!("unexpected response to {kind}: {response:?}"),
    }
}

async fn run_dispatcher<A>(api: Arc<A>, shared: Arc<Shared>)
where
    A: PlatformApi + 'static,
{
    loop {
        let next = {
            let mut state = shared.state.lock().await;
            match state.pop_next() {
                Some(request) => Some(request),
                None if state.closed => break,
                None => None,
            }
        };

        match next {
            Some(request) => dispatch(api.as_ref(), &shared, request).await,
            None => shared.wakeup.notified().await,
        }
    }
    debug!("Request queue dispatcher stopped");
}

async fn wait_for_budget(shared: &Shared, kind: &str) {
    loop {
        let wait = {
            let mut budget = shared.budget.lock().await;
            match budget.try_acquire(kind, Instant::now()) {
                Ok(()) => return,
                Err(wait) => wait,
            }
        };
        debug!("Rate budget for {} exhausted, waiting {:?}", kind, wait);
        sleep(wait).await;
    }
}

async fn execute<A: PlatformApi>(api: &A, request: &ApiRequest) -> Result<ApiResponse, CoreError> {
    match request {
        ApiRequest::ListNotifications { limit } => api
            .list_notifications(*limit)
            .await
            .map(ApiResponse::Notifications),
        ApiRequest::GetProfile { actor } => {
            api.fetch_profile(actor).await.map(ApiResponse::Profile)
        }
        ApiRequest::GetAuthorFeed {
            actor,
            cursor,
            limit,
        } => api
            .fetch_author_feed(actor, cursor.as_deref(), *limit)
            .await
            .map(ApiResponse::Feed),
        ApiRequest::PostReply { reply_to, text } => {
            api.post_reply(reply_to, text).await.map(ApiResponse::Posted)
        }
        ApiRequest::MarkSeen { seen_at } => {
            api.mark_seen(*seen_at).await.map(|()| ApiResponse::Seen)
        }
    }
}

async fn dispatch<A: PlatformApi>(api: &A, shared: &Shared, mut queued: QueuedRequest) {
    let kind = queued.request.kind();
    if queued.result_sender.is_closed() {
        debug!(
            "Dropping request {} ({}), its caller stopped waiting",
            queued.request_id, kind
        );
        return;
    }

    wait_for_budget(shared, kind).await;
    queued.attempts += 1;

    let retry = &shared.config.retry;
    debug!(
        "Dispatching request {} ({}) attempt {} after {:?} in queue",
        queued.request_id,
        kind,
        queued.attempts,
        queued.queued_at.elapsed()
    );

    let upkeep_before = api.session_calls();
    let started = Instant::now();
    let result = match timeout(shared.config.request_timeout, execute(api, &queued.request)).await
    {
        Ok(result) => result,
        Err(_) => Err(CoreError::Platform(PlatformApiError::RequestTimeout)),
    };
    let response_time = started.elapsed();

    let upkeep = api.session_calls().saturating_sub(upkeep_before);
    if upkeep > 0 {
        debug!(
            "Request {} ({}) made {} session calls, charging them to the budget",
            queued.request_id, kind, upkeep
        );
        let calls = u32::try_from(upkeep).unwrap_or(u32::MAX);
        shared.budget.lock().await.charge_upkeep(calls, Instant::now());
    }

    let (outcome, retry_delay, final_result) = match result {
        Ok(response) => (DispatchOutcome::Succeeded, None, Some(Ok(response))),
        Err(error) => match get_retry_strategy(&error) {
            RetryStrategy::Throttled(hint) => {
                if queued.attempts >= retry.max_attempts {
                    error!(
                        "Request {} ({}) still throttled after {} attempts",
                        queued.request_id, kind, queued.attempts
                    );
                    let exhausted = CoreError::RateLimitExceeded {
                        request: kind.to_string(),
                        attempts: queued.attempts,
                    };
                    (DispatchOutcome::Throttled, None, Some(Err(exhausted)))
                } else {
                    let delay = throttle_delay(queued.attempts - 1, hint, retry);
                    warn!(
                        "Request {} ({}) throttled, pausing dispatch for {:?}",
                        queued.request_id, kind, delay
                    );
                    (DispatchOutcome::Throttled, Some(delay), None)
                }
            }
            RetryStrategy::Transient => {
                if queued.attempts >= retry.max_attempts {
                    error!(
                        "Request {} ({}) failed after {} attempts: {}",
                        queued.request_id, kind, queued.attempts, error
                    );
                    let exhausted = CoreError::Transient {
                        request: kind.to_string(),
                        attempts: queued.attempts,
                        message: error.to_string(),
                    };
                    (DispatchOutcome::TransientFailure, None, Some(Err(exhausted)))
                } else {
                    let delay = retry.transient_delay();
                    warn!(
                        "Request {} ({}) failed transiently, retrying in {:?}: {}",
                        queued.request_id, kind, delay, error
                    );
                    (DispatchOutcome::TransientFailure, Some(delay), None)
                }
            }
            RetryStrategy::NoRetry => {
                debug!(
                    "Not retrying request {} ({}) due to error type: {}",
                    queued.request_id, kind, error
                );
                (DispatchOutcome::PermanentFailure, None, Some(Err(error)))
            }
        },
    };

    shared
        .metrics
        .record_request(RequestMetrics {
            kind,
            response_time,
            outcome,
        })
        .await;

    if let Some(result) = final_result {
        if queued.result_sender.send(result).is_err() {
            warn!(
                "Caller for request {} ({}) went away before the result arrived",
                queued.request_id, kind
            );
        }
        return;
    }

    if let Some(delay) = retry_delay {
        sleep(delay).await;
    }

    let priority = queued.priority;
    let mut state = shared.state.lock().await;
    state.classes[priority.index()].push_front(queued);
}
