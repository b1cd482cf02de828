pub mod pipeline;

#[cfg(test)]
mod tests;

pub use pipeline::{FeedLimits, MentionOutcome, MentionProcessor};

use bluesky_client::RequestQueue;
use chrono::Utc;
use database::MentionStore;
use futures::stream::{self, StreamExt};
use reputebot_core::{
    CoreError, ErrorRecovery, ErrorReporter, Mention, PollingConfig, RecoveryStrategy,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Counts for one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub notifications: usize,
    pub new_mentions: usize,
    pub stale_mentions: usize,
    pub replied: usize,
    pub fallbacks: usize,
    pub failed: usize,
    pub requeued: usize,
    pub skipped: usize,
}

impl CycleReport {
    fn record(&mut self, outcome: &MentionOutcome) {
        match outcome {
            MentionOutcome::Skipped => self.skipped += 1,
            MentionOutcome::Replied { fallback, .. } => {
                self.replied += 1;
                if *fallback {
                    self.fallbacks += 1;
                }
            }
            MentionOutcome::Failed { .. } => self.failed += 1,
            MentionOutcome::Requeued { .. } => self.requeued += 1,
        }
    }
}

/// The poll loop: list notifications, append mentions to the ledger, answer
/// them on a bounded worker pool, mark the notifications seen.
pub struct BackgroundService<S> {
    queue: RequestQueue,
    store: Arc<S>,
    processor: Arc<MentionProcessor<S>>,
    polling: PollingConfig,
    reporter: ErrorReporter,
}

impl<S: MentionStore> BackgroundService<S> {
    pub fn new(
        queue: RequestQueue,
        store: Arc<S>,
        processor: MentionProcessor<S>,
        polling: PollingConfig,
    ) -> Self {
        Self {
            queue,
            store,
            processor: Arc::new(processor),
            polling,
            reporter: ErrorReporter::new(),
        }
    }

    /// Polls until `shutdown` flips to `true` (or its sender is dropped).
    /// Returns an error only when authentication fails.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), CoreError> {
        info!(
            "Mention polling started (every {:?}, {} workers)",
            self.polling.interval(),
            self.polling.max_concurrent_mentions
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.run_cycle().await {
                Ok(report) => {
                    if report.new_mentions > 0 || report.replied > 0 || report.requeued > 0 {
                        info!("Poll cycle finished: {:?}", report);
                    } else {
                        debug!("Poll cycle finished: {:?}", report);
                    }
                    self.log_queue_health().await;
                    self.polling.interval()
                }
                Err(e) => {
                    if ErrorRecovery::determine_strategy(&e) == RecoveryStrategy::Halt {
                        error!("Stopping mention polling: {}", e);
                        return Err(e);
                    }
                    self.reporter.report_error(&e);
                    warn!(
                        "Poll cycle failed, backing off for {:?}",
                        self.polling.error_backoff()
                    );
                    self.polling.error_backoff()
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Mention polling stopped");
        Ok(())
    }

    async fn log_queue_health(&self) {
        let stats = self.queue.get_queue_stats().await;
        debug!(
            "Request queue: {} waiting, {}/{} calls this window, {} dispatches so far",
            stats.total_queued(),
            stats.rate_limit.calls_made,
            stats.rate_limit.max_calls_per_window,
            stats.metrics.total_dispatches
        );
        if stats.rate_limit.is_near_limit() {
            warn!(
                "Account rate budget {:.0}% used, resets in {:?}",
                stats.rate_limit.window_utilization_percentage(),
                stats.rate_limit.time_until_window_reset
            );
        }
        for kind in stats.endpoints_near_limit() {
            warn!("Rate budget for {} is nearly spent", kind);
        }
    }

    pub async fn run_cycle(&self) -> Result<CycleReport, CoreError> {
        let cycle_started = Utc::now();
        let mut report = CycleReport::default();

        let notifications = self
            .queue
            .list_notifications(self.polling.notification_limit)
            .await?;
        report.notifications = notifications.len();

        let max_age = self.polling.max_mention_age();
        let is_fresh = |mention: &Mention| cycle_started - mention.timestamp <= max_age;

        for mention in notifications.iter().filter_map(Mention::from_notification) {
            if !is_fresh(&mention) {
                debug!("Dropping stale mention {} from {}", mention.id, mention.timestamp);
                report.stale_mentions += 1;
                continue;
            }
            if self.store.record_mention(&mention).await? {
                report.new_mentions += 1;
            }
        }

        // Mentions left pending by earlier cycles age out the same way.
        let (fresh, stale): (Vec<Mention>, Vec<Mention>) = self
            .store
            .pending_mentions()
            .await?
            .into_iter()
            .partition(is_fresh);
        report.stale_mentions += stale.len();

        let workers = self.polling.max_concurrent_mentions.max(1);
        let results: Vec<Result<MentionOutcome, CoreError>> = stream::iter(fresh)
            .map(|mention| {
                let processor = self.processor.clone();
                async move { processor.process(&mention).await }
            })
            .buffer_unordered(workers)
            .collect()
            .await;

        let mut fatal = None;
        for result in results {
            match result {
                Ok(outcome) => report.record(&outcome),
                Err(e) => {
                    fatal.get_or_insert(e);
                }
            }
        }
        if let Some(e) = fatal {
            return Err(e);
        }

        if report.notifications > 0 {
            if let Err(e) = self.queue.mark_seen(cycle_started).await {
                if ErrorRecovery::determine_strategy(&e) == RecoveryStrategy::Halt {
                    return Err(e);
                }
                self.reporter.report_warning(&e);
            }
        }

        Ok(report)
    }
}
