use analysis_engine::{format, format_insufficient, truncate_reply, window_start, AnalysisEngine};
use bluesky_client::RequestQueue;
use chrono::Utc;
use database::{DedupGuard, MentionStore};
use reputebot_core::{
    AnalysisSettings, CoreError, ErrorExt, ErrorRecovery, Mention, Post, RecoveryStrategy,
    ReplyOutcome,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What happened to one mention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MentionOutcome {
    /// Already handled, or being handled by another worker.
    Skipped,
    /// A reply went out. `fallback` marks the "not enough data" report.
    Replied { reply_uri: String, fallback: bool },
    /// Permanently failed; recorded and never retried.
    Failed { reason: String },
    /// Released for a later poll.
    Requeued { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedLimits {
    pub page_size: u32,
    pub max_posts: usize,
    pub reply_max_chars: usize,
}

impl From<&AnalysisSettings> for FeedLimits {
    fn from(settings: &AnalysisSettings) -> Self {
        Self {
            page_size: settings.page_size,
            max_posts: settings.max_posts,
            reply_max_chars: settings.reply_max_chars,
        }
    }
}

struct Reply {
    text: String,
    fallback: bool,
}

/// Answers a single mention: claim, analyze the target, reply, record.
pub struct MentionProcessor<S> {
    queue: RequestQueue,
    guard: Arc<DedupGuard<S>>,
    engine: Arc<AnalysisEngine>,
    limits: FeedLimits,
}

impl<S: MentionStore> MentionProcessor<S> {
    pub fn new(
        queue: RequestQueue,
        guard: Arc<DedupGuard<S>>,
        engine: Arc<AnalysisEngine>,
        limits: FeedLimits,
    ) -> Self {
        Self {
            queue,
            guard,
            engine,
            limits,
        }
    }

    pub fn guard(&self) -> &Arc<DedupGuard<S>> {
        &self.guard
    }

    /// Errors are only returned when the bot should stop (authentication).
    /// Everything else ends up in the returned outcome.
    pub async fn process(&self, mention: &Mention) -> Result<MentionOutcome, CoreError> {
        match self.guard.should_process(&mention.id).await {
            Ok(true) => {}
            Ok(false) => return Ok(MentionOutcome::Skipped),
            Err(e) => {
                e.log_warn();
                return Ok(MentionOutcome::Requeued {
                    reason: e.to_string(),
                });
            }
        }

        info!(
            "Processing mention {} from @{} about {}",
            mention.id, mention.author_handle, mention.target_handle
        );

        let reply = match self.compose_reply(mention).await {
            Ok(reply) => reply,
            Err(e) => return self.recover(mention, e).await,
        };

        let text = truncate_reply(&reply.text, self.limits.reply_max_chars);
        match self.queue.post_reply(&mention.reply_to, &text).await {
            Ok(posted) => {
                info!("Replied to mention {} with {}", mention.id, posted.uri);
                let outcome = ReplyOutcome::Posted {
                    uri: posted.uri.clone(),
                };
                if let Err(e) = self.guard.mark_processed(&mention.id, &outcome).await {
                    error!(
                        "Reply {} posted but the ledger could not record it: {}",
                        posted.uri, e
                    );
                }
                Ok(MentionOutcome::Replied {
                    reply_uri: posted.uri,
                    fallback: reply.fallback,
                })
            }
            Err(e) => self.recover(mention, e).await,
        }
    }

    async fn compose_reply(&self, mention: &Mention) -> Result<Reply, CoreError> {
        let profile = match self.queue.fetch_profile(&mention.target_handle).await {
            Ok(profile) => profile,
            Err(e) if ErrorRecovery::determine_strategy(&e) == RecoveryStrategy::Fallback => {
                warn!("Target {} unavailable: {}", mention.target_handle, e);
                return Ok(Reply {
                    text: format_insufficient(&mention.target_handle),
                    fallback: true,
                });
            }
            Err(e) => return Err(e),
        };

        let posts = self.collect_recent_posts(&profile.did).await?;
        debug!("Collected {} recent posts for @{}", posts.len(), profile.handle);

        let insufficient = || Reply {
            text: format_insufficient(&profile.handle),
            fallback: true,
        };
        match self.engine.evaluate(&profile.handle, &posts) {
            Ok(result) if result.low_confidence => {
                info!(
                    "Too little recent activity to judge @{} with confidence",
                    profile.handle
                );
                Ok(insufficient())
            }
            Ok(result) => Ok(Reply {
                text: format(&profile.handle, &result),
                fallback: false,
            }),
            Err(e) => {
                let e = CoreError::from(e);
                if e.is_insufficient_data() {
                    info!("Not enough recent posts to judge @{}", profile.handle);
                    Ok(insufficient())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Pages through the author feed, newest first, until a post falls
    /// outside the lookback window or the post cap is reached.
    async fn collect_recent_posts(&self, actor: &str) -> Result<Vec<Post>, CoreError> {
        let oldest = window_start(self.engine.window_days(), Utc::now())?;
        let mut posts = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self
                .queue
                .fetch_author_feed(actor, cursor.as_deref(), self.limits.page_size)
                .await?;
            if page.posts.is_empty() {
                break;
            }

            let mut reached_window_edge = false;
            for post in page.posts {
                if post.timestamp < oldest {
                    reached_window_edge = true;
                    continue;
                }
                if posts.len() < self.limits.max_posts {
                    posts.push(post);
                }
            }

            if reached_window_edge || posts.len() >= self.limits.max_posts {
                break;
            }
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(posts)
    }

    async fn recover(
        &self,
        mention: &Mention,
        error: CoreError,
    ) -> Result<MentionOutcome, CoreError> {
        match ErrorRecovery::determine_strategy(&error) {
            RecoveryStrategy::Requeue => {
                warn!("Mention {} requeued: {}", mention.id, error);
                self.guard.release(&mention.id).await;
                Ok(MentionOutcome::Requeued {
                    reason: error.to_string(),
                })
            }
            RecoveryStrategy::Halt => {
                self.guard.release(&mention.id).await;
                Err(error)
            }
            RecoveryStrategy::Abandon | RecoveryStrategy::Fallback => {
                error.log_error();
                let reason = error.to_string();
                let outcome = ReplyOutcome::Failed {
                    reason: reason.clone(),
                };
                if let Err(e) = self.guard.mark_processed(&mention.id, &outcome).await {
                    error!("Could not record failure for mention {}: {}", mention.id, e);
                }
                Ok(MentionOutcome::Failed { reason })
            }
        }
    }
}
