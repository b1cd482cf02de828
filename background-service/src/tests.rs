use crate::{BackgroundService, FeedLimits, MentionOutcome, MentionProcessor};
use analysis_engine::{AnalysisEngine, AnalysisRules};
use bluesky_client::{PlatformApi, QueueConfig, RateLimitConfig, RequestQueue, RetryConfig};
use chrono::{DateTime, Duration, Utc};
use database::{DedupGuard, MemoryStore, MentionStore};
use reputebot_core::{
    AnalysisSettings, CoreError, FeedPage, Mention, Notification, PlatformApiError,
    PollingConfig, Post, PostRef, Profile, ReplyOutcome, ReplyRef,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// In-memory stand-in for the platform.
#[derive(Default)]
struct MockPlatform {
    notifications: Mutex<Vec<Notification>>,
    notification_failures: Mutex<VecDeque<CoreError>>,
    list_calls: Mutex<usize>,
    profiles: Mutex<HashMap<String, Profile>>,
    feeds: Mutex<HashMap<(String, Option<String>), FeedPage>>,
    feed_cursors: Mutex<Vec<Option<String>>>,
    reply_failures: Mutex<VecDeque<CoreError>>,
    replies: Mutex<Vec<(ReplyRef, String)>>,
    seen: Mutex<Vec<DateTime<Utc>>>,
}

impl MockPlatform {
    fn with_account(self, handle: &str, did: &str, posts: Vec<Post>) -> Self {
        let profile = Profile {
            did: did.to_string(),
            handle: handle.to_string(),
            display_name: None,
            posts_count: Some(posts.len() as u64),
        };
        {
            let mut profiles = self.profiles.lock().unwrap();
            profiles.insert(handle.to_string(), profile.clone());
            profiles.insert(did.to_string(), profile);
        }
        self.with_feed_page(did, None, posts, None)
    }

    fn with_feed_page(
        self,
        did: &str,
        cursor: Option<&str>,
        posts: Vec<Post>,
        next: Option<&str>,
    ) -> Self {
        self.feeds.lock().unwrap().insert(
            (did.to_string(), cursor.map(str::to_string)),
            FeedPage {
                posts,
                cursor: next.map(str::to_string),
            },
        );
        self
    }

    fn with_notifications(self, notifications: Vec<Notification>) -> Self {
        *self.notifications.lock().unwrap() = notifications;
        self
    }

    fn failing_replies(self, errors: Vec<CoreError>) -> Self {
        *self.reply_failures.lock().unwrap() = errors.into();
        self
    }

    fn failing_listings(self, errors: Vec<CoreError>) -> Self {
        *self.notification_failures.lock().unwrap() = errors.into();
        self
    }

    fn replies(&self) -> Vec<(ReplyRef, String)> {
        self.replies.lock().unwrap().clone()
    }
}

impl PlatformApi for MockPlatform {
    async fn list_notifications(&self, _limit: u32) -> Result<Vec<Notification>, CoreError> {
        *self.list_calls.lock().unwrap() += 1;
        if let Some(error) = self.notification_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(self.notifications.lock().unwrap().clone())
    }

    async fn fetch_profile(&self, actor: &str) -> Result<Profile, CoreError> {
        if actor == "locked.bsky.social" {
            return Err(CoreError::Platform(PlatformApiError::AuthenticationFailed {
                reason: "session revoked".to_string(),
            }));
        }
        self.profiles
            .lock()
            .unwrap()
            .get(actor)
            .cloned()
            .ok_or_else(|| {
                CoreError::Platform(PlatformApiError::ActorNotFound {
                    actor: actor.to_string(),
                })
            })
    }

    async fn fetch_author_feed(
        &self,
        actor: &str,
        cursor: Option<&str>,
        _limit: u32,
    ) -> Result<FeedPage, CoreError> {
        self.feed_cursors
            .lock()
            .unwrap()
            .push(cursor.map(str::to_string));
        Ok(self
            .feeds
            .lock()
            .unwrap()
            .get(&(actor.to_string(), cursor.map(str::to_string)))
            .cloned()
            .unwrap_or_default())
    }

    async fn post_reply(&self, reply_to: &ReplyRef, text: &str) -> Result<PostRef, CoreError> {
        if let Some(error) = self.reply_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let mut replies = self.replies.lock().unwrap();
        replies.push((reply_to.clone(), text.to_string()));
        Ok(PostRef {
            uri: format!("at://did:plc:bot/app.bsky.feed.post/r{}", replies.len()),
            cid: format!("bafyr{}", replies.len()),
        })
    }

    async fn mark_seen(&self, seen_at: DateTime<Utc>) -> Result<(), CoreError> {
        self.seen.lock().unwrap().push(seen_at);
        Ok(())
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("background_service=debug,bluesky_client=info")
        .with_test_writer()
        .try_init();
}

struct Harness {
    api: Arc<MockPlatform>,
    queue: RequestQueue,
    store: Arc<MemoryStore>,
    guard: Arc<DedupGuard<MemoryStore>>,
}

impl Harness {
    fn new(api: MockPlatform) -> Self {
        init_logging();
        let api = Arc::new(api);
        let queue = RequestQueue::start(
            api.clone(),
            QueueConfig {
                rate_limit: RateLimitConfig {
                    max_calls_per_window: 1000,
                    window: std::time::Duration::from_secs(60),
                    endpoints: BTreeMap::new(),
                },
                retry: RetryConfig {
                    max_attempts: 3,
                    base_delay_ms: 1000,
                    max_delay_ms: 10_000,
                    backoff_multiplier: 2.0,
                    jitter_factor: 0.0,
                    transient_delay_ms: 500,
                },
                request_timeout: std::time::Duration::from_secs(10),
            },
        );
        let store = Arc::new(MemoryStore::new());
        let guard = Arc::new(DedupGuard::new(store.clone()));
        Self {
            api,
            queue,
            store,
            guard,
        }
    }

    fn processor(&self) -> MentionProcessor<MemoryStore> {
        self.processor_with(FeedLimits::from(&AnalysisSettings::default()))
    }

    fn processor_with(&self, limits: FeedLimits) -> MentionProcessor<MemoryStore> {
        let engine = AnalysisEngine::new(AnalysisRules::default(), &AnalysisSettings::default());
        MentionProcessor::new(
            self.queue.clone(),
            self.guard.clone(),
            Arc::new(engine),
            limits,
        )
    }

    fn service(&self) -> BackgroundService<MemoryStore> {
        BackgroundService::new(
            self.queue.clone(),
            self.store.clone(),
            self.processor(),
            PollingConfig::default(),
        )
    }

    /// Records the mention in the ledger, as the poll loop would.
    async fn record(&self, notification: &Notification) -> Mention {
        let mention = Mention::from_notification(notification).unwrap();
        self.store.record_mention(&mention).await.unwrap();
        mention
    }
}

fn post(text: &str, days_ago: i64, is_original: bool) -> Post {
    Post {
        id: format!("at://did:plc:target/app.bsky.feed.post/{}", text.len()),
        author_handle: "target.bsky.social".to_string(),
        text: text.to_string(),
        timestamp: Utc::now() - Duration::days(days_ago),
        is_original,
    }
}

fn upbeat_posts() -> Vec<Post> {
    vec![
        post("Love shipping Rust code with this community!", 1, true),
        post("Great docker tips from the team today", 2, true),
        post("Our new api is awesome", 3, true),
    ]
}

fn mention_notification(
    n: u32,
    author: &str,
    minutes_ago: i64,
    reply_parent_did: Option<&str>,
) -> Notification {
    let author_did = format!("did:plc:{}", author.split('.').next().unwrap_or(author));
    Notification {
        uri: format!("at://{author_did}/app.bsky.feed.post/m{n}"),
        cid: format!("bafym{n}"),
        reason: "mention".to_string(),
        author_handle: author.to_string(),
        author_did,
        indexed_at: Utc::now() - Duration::minutes(minutes_ago),
        reply: reply_parent_did.map(|did| ReplyRef {
            root: PostRef {
                uri: format!("at://{did}/app.bsky.feed.post/root"),
                cid: "bafyroot".to_string(),
            },
            parent: PostRef {
                uri: format!("at://{did}/app.bsky.feed.post/parent"),
                cid: "bafyparent".to_string(),
            },
        }),
    }
}

fn rate_limited() -> CoreError {
    CoreError::Platform(PlatformApiError::RateLimitExceeded {
        retry_after: Some(1),
    })
}

#[tokio::test(start_paused = true)]
async fn test_mention_gets_a_report() {
    let harness = Harness::new(MockPlatform::default().with_account(
        "target.bsky.social",
        "did:plc:target",
        upbeat_posts(),
    ));
    let mention = harness
        .record(&mention_notification(1, "target.bsky.social", 1, None))
        .await;
    let processor = harness.processor();

    let outcome = processor.process(&mention).await.unwrap();
    assert!(matches!(
        outcome,
        MentionOutcome::Replied { fallback: false, .. }
    ));

    let replies = harness.api.replies();
    assert_eq!(replies.len(), 1);
    let (reply_to, text) = &replies[0];
    assert_eq!(reply_to, &mention.reply_to);
    assert!(text.starts_with("Should you follow @target.bsky.social?\n✅ Yes"));
    assert!(text.contains("🔹 ~0.1 posts/day, mostly original"));
    assert!(text.contains("📌 Add to your Tech Feed."));

    let entry = harness.store.get_entry(&mention.id).await.unwrap().unwrap();
    assert!(entry.mention.processed);
    assert!(matches!(entry.outcome, Some(ReplyOutcome::Posted { .. })));

    assert_eq!(
        processor.process(&mention).await.unwrap(),
        MentionOutcome::Skipped
    );
    assert_eq!(harness.api.replies().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reply_to_another_post_reports_on_its_author() {
    let harness = Harness::new(MockPlatform::default().with_account(
        "other.bsky.social",
        "did:plc:other",
        upbeat_posts(),
    ));
    let mention = harness
        .record(&mention_notification(
            2,
            "asker.bsky.social",
            1,
            Some("did:plc:other"),
        ))
        .await;

    harness.processor().process(&mention).await.unwrap();

    let replies = harness.api.replies();
    assert!(replies[0]
        .1
        .starts_with("Should you follow @other.bsky.social?"));
    assert_eq!(replies[0].0.root.cid, "bafyroot");
    assert_eq!(replies[0].0.parent.cid, "bafym2");
}

#[tokio::test(start_paused = true)]
async fn test_unknown_target_gets_fallback_reply() {
    let harness = Harness::new(MockPlatform::default());
    let mention = harness
        .record(&mention_notification(3, "ghost.bsky.social", 1, None))
        .await;

    let outcome = harness.processor().process(&mention).await.unwrap();
    assert!(matches!(
        outcome,
        MentionOutcome::Replied { fallback: true, .. }
    ));
    assert!(harness.api.replies()[0].1.contains("Not sure yet"));
    assert!(harness.store.is_processed(&mention.id).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_quiet_account_gets_fallback_reply() {
    let harness = Harness::new(MockPlatform::default().with_account(
        "quiet.bsky.social",
        "did:plc:quiet",
        vec![post("back from a long break", 60, true)],
    ));
    let mention = harness
        .record(&mention_notification(4, "quiet.bsky.social", 1, None))
        .await;

    let outcome = harness.processor().process(&mention).await.unwrap();
    assert!(matches!(
        outcome,
        MentionOutcome::Replied { fallback: true, .. }
    ));
    assert!(harness.api.replies()[0]
        .1
        .starts_with("Should you follow @quiet.bsky.social?"));
}

#[tokio::test(start_paused = true)]
async fn test_single_recent_post_gets_fallback_reply() {
    let harness = Harness::new(MockPlatform::default().with_account(
        "newbie.bsky.social",
        "did:plc:newbie",
        vec![post("Love this place, great people!", 1, true)],
    ));
    let mention = harness
        .record(&mention_notification(12, "newbie.bsky.social", 1, None))
        .await;

    let outcome = harness.processor().process(&mention).await.unwrap();
    assert!(matches!(
        outcome,
        MentionOutcome::Replied { fallback: true, .. }
    ));
    let text = &harness.api.replies()[0].1;
    assert!(text.starts_with("Should you follow @newbie.bsky.social?\n🤔 Not sure yet"));
    assert!(!text.contains("✅"));
    assert!(harness.store.is_processed(&mention.id).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_feed_paging_stops_at_window_edge() {
    let api = MockPlatform::default()
        .with_account("target.bsky.social", "did:plc:target", Vec::new())
        .with_feed_page(
            "did:plc:target",
            None,
            vec![post("great day", 1, true), post("nice work", 2, true)],
            Some("p2"),
        )
        .with_feed_page(
            "did:plc:target",
            Some("p2"),
            vec![post("good luck", 3, false), post("old news", 45, true)],
            Some("p3"),
        )
        .with_feed_page(
            "did:plc:target",
            Some("p3"),
            vec![post("ancient", 90, true)],
            None,
        );
    let harness = Harness::new(api);
    let mention = harness
        .record(&mention_notification(5, "target.bsky.social", 1, None))
        .await;

    harness.processor().process(&mention).await.unwrap();

    assert_eq!(
        *harness.api.feed_cursors.lock().unwrap(),
        vec![None, Some("p2".to_string())]
    );
    assert!(harness.api.replies()[0].1.contains("~0.1 posts/day"));
}

#[tokio::test(start_paused = true)]
async fn test_feed_paging_respects_post_cap() {
    let api = MockPlatform::default()
        .with_account("target.bsky.social", "did:plc:target", Vec::new())
        .with_feed_page(
            "did:plc:target",
            None,
            vec![post("great day", 1, true), post("nice work", 1, true)],
            Some("p2"),
        )
        .with_feed_page(
            "did:plc:target",
            Some("p2"),
            vec![post("good luck", 2, true), post("so fun", 2, true)],
            Some("p3"),
        );
    let harness = Harness::new(api);
    let mention = harness
        .record(&mention_notification(6, "target.bsky.social", 1, None))
        .await;
    let processor = harness.processor_with(FeedLimits {
        page_size: 2,
        max_posts: 3,
        reply_max_chars: 300,
    });

    processor.process(&mention).await.unwrap();

    assert_eq!(harness.api.feed_cursors.lock().unwrap().len(), 2);
    assert!(harness.api.replies()[0].1.contains("~0.1 posts/day"));
}

#[tokio::test(start_paused = true)]
async fn test_reply_is_truncated_to_limit() {
    let harness = Harness::new(MockPlatform::default().with_account(
        "target.bsky.social",
        "did:plc:target",
        upbeat_posts(),
    ));
    let mention = harness
        .record(&mention_notification(7, "target.bsky.social", 1, None))
        .await;
    let processor = harness.processor_with(FeedLimits {
        page_size: 20,
        max_posts: 1000,
        reply_max_chars: 40,
    });

    processor.process(&mention).await.unwrap();

    let text = &harness.api.replies()[0].1;
    assert_eq!(text.chars().count(), 40);
    assert!(text.ends_with("..."));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_reply_is_requeued() {
    let api = MockPlatform::default()
        .with_account("target.bsky.social", "did:plc:target", upbeat_posts())
        .failing_replies(vec![rate_limited(), rate_limited(), rate_limited()]);
    let harness = Harness::new(api);
    let mention = harness
        .record(&mention_notification(8, "target.bsky.social", 1, None))
        .await;
    let processor = harness.processor();

    let outcome = processor.process(&mention).await.unwrap();
    assert!(matches!(outcome, MentionOutcome::Requeued { .. }));
    assert!(!harness.store.is_processed(&mention.id).await.unwrap());
    assert_eq!(harness.guard.in_flight().await, 0);

    let outcome = processor.process(&mention).await.unwrap();
    assert!(matches!(outcome, MentionOutcome::Replied { .. }));
    assert_eq!(harness.api.replies().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_reply_is_recorded_as_failed() {
    let api = MockPlatform::default()
        .with_account("target.bsky.social", "did:plc:target", upbeat_posts())
        .failing_replies(vec![CoreError::Platform(PlatformApiError::BadRequest {
            details: "reply not allowed".to_string(),
        })]);
    let harness = Harness::new(api);
    let mention = harness
        .record(&mention_notification(9, "target.bsky.social", 1, None))
        .await;
    let processor = harness.processor();

    let outcome = processor.process(&mention).await.unwrap();
    assert!(matches!(outcome, MentionOutcome::Failed { .. }));

    let entry = harness.store.get_entry(&mention.id).await.unwrap().unwrap();
    assert!(matches!(entry.outcome, Some(ReplyOutcome::Failed { .. })));
    assert_eq!(
        processor.process(&mention).await.unwrap(),
        MentionOutcome::Skipped
    );
    assert!(harness.api.replies().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_auth_failure_is_fatal_and_releases_claim() {
    let harness = Harness::new(MockPlatform::default());
    let mention = harness
        .record(&mention_notification(10, "locked.bsky.social", 1, None))
        .await;

    let result = harness.processor().process(&mention).await;
    assert!(matches!(
        result,
        Err(CoreError::Platform(PlatformApiError::AuthenticationFailed { .. }))
    ));
    assert_eq!(harness.guard.in_flight().await, 0);
    assert!(!harness.store.is_processed(&mention.id).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_duplicates_reply_once() {
    let harness = Harness::new(MockPlatform::default().with_account(
        "target.bsky.social",
        "did:plc:target",
        upbeat_posts(),
    ));
    let mention = harness
        .record(&mention_notification(11, "target.bsky.social", 1, None))
        .await;
    let processor = harness.processor();

    let (a, b) = tokio::join!(processor.process(&mention), processor.process(&mention));
    let outcomes = [a.unwrap(), b.unwrap()];
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| matches!(o, MentionOutcome::Replied { .. }))
            .count(),
        1
    );
    assert!(outcomes.contains(&MentionOutcome::Skipped));
    assert_eq!(harness.api.replies().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cycle_answers_fresh_mentions_once() {
    let mut like = mention_notification(20, "fan.bsky.social", 1, None);
    like.reason = "like".to_string();
    let api = MockPlatform::default()
        .with_account("target.bsky.social", "did:plc:target", upbeat_posts())
        .with_notifications(vec![
            like,
            mention_notification(21, "target.bsky.social", 5, None),
            mention_notification(22, "ghost.bsky.social", 10, None),
            mention_notification(23, "target.bsky.social", 180, None),
        ]);
    let harness = Harness::new(api);
    let service = harness.service();

    let report = service.run_cycle().await.unwrap();
    assert_eq!(report.notifications, 4);
    assert_eq!(report.new_mentions, 2);
    assert_eq!(report.stale_mentions, 1);
    assert_eq!(report.replied, 2);
    assert_eq!(report.fallbacks, 1);
    assert_eq!(harness.api.seen.lock().unwrap().len(), 1);

    let report = service.run_cycle().await.unwrap();
    assert_eq!(report.new_mentions, 0);
    assert_eq!(report.stale_mentions, 1);
    assert_eq!(report.replied, 0);
    assert!(harness
        .store
        .get_entry("at://did:plc:target/app.bsky.feed.post/m23")
        .await
        .unwrap()
        .is_none());
    assert_eq!(harness.api.replies().len(), 2);
    assert_eq!(harness.api.seen.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_requeued_mention_is_retried_next_cycle() {
    let server_error = || CoreError::Platform(PlatformApiError::ServerError { status_code: 503 });
    let api = MockPlatform::default()
        .with_account("target.bsky.social", "did:plc:target", upbeat_posts())
        .with_notifications(vec![mention_notification(
            30,
            "target.bsky.social",
            1,
            None,
        )])
        .failing_replies(vec![server_error(), server_error(), server_error()]);
    let harness = Harness::new(api);
    let service = harness.service();

    let first = service.run_cycle().await.unwrap();
    assert_eq!(first.requeued, 1);
    assert_eq!(first.replied, 0);

    let second = service.run_cycle().await.unwrap();
    assert_eq!(second.replied, 1);
    assert_eq!(harness.api.replies().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_on_shutdown() {
    let harness = Harness::new(MockPlatform::default().with_notifications(vec![
        mention_notification(40, "ghost.bsky.social", 1, None),
    ]));
    let service = harness.service();
    let (tx, rx) = watch::channel(false);

    let stopper = async {
        while harness.api.seen.lock().unwrap().is_empty() {
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        }
        tx.send(true).unwrap();
    };
    let (result, ()) = tokio::join!(service.run(rx), stopper);

    assert!(result.is_ok());
    assert_eq!(harness.api.replies().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_halts_on_authentication_failure() {
    let api = MockPlatform::default().failing_listings(vec![CoreError::Platform(
        PlatformApiError::AuthenticationFailed {
            reason: "bad app password".to_string(),
        },
    )]);
    let harness = Harness::new(api);
    let (_tx, rx) = watch::channel(false);

    let result = harness.service().run(rx).await;
    assert!(matches!(
        result,
        Err(CoreError::Platform(PlatformApiError::AuthenticationFailed { .. }))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_failed_cycle_backs_off_then_recovers() {
    let server_error = || CoreError::Platform(PlatformApiError::ServerError { status_code: 502 });
    let api = MockPlatform::default()
        .with_notifications(vec![mention_notification(50, "ghost.bsky.social", 1, None)])
        .failing_listings(vec![server_error(), server_error(), server_error()]);
    let harness = Harness::new(api);
    let service = harness.service();
    let (tx, rx) = watch::channel(false);
    let started = tokio::time::Instant::now();

    let stopper = async {
        while harness.api.replies().is_empty() {
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        }
        tx.send(true).unwrap();
    };
    let (result, ()) = tokio::join!(service.run(rx), stopper);

    assert!(result.is_ok());
    assert_eq!(*harness.api.list_calls.lock().unwrap(), 4);
    assert!(started.elapsed() >= std::time::Duration::from_secs(60));
}
