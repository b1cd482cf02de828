use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Strong reference to a post record: the pair the platform needs to thread a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRef {
    pub uri: String,
    pub cid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRef {
    pub root: PostRef,
    pub parent: PostRef,
}

/// Raw inbound notification as returned by the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub uri: String,
    pub cid: String,
    pub reason: String,
    pub author_handle: String,
    pub author_did: String,
    pub indexed_at: DateTime<Utc>,
    pub reply: Option<ReplyRef>,
}

impl Notification {
    pub fn is_mention(&self) -> bool {
        self.reason == "mention"
    }
}

/// A mention of the bot. Ledger entries are append-only; only `processed` ever flips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mention {
    pub id: String,
    pub cid: String,
    pub author_handle: String,
    /// Handle or DID of the account to report on.
    pub target_handle: String,
    pub timestamp: DateTime<Utc>,
    pub reply_to: ReplyRef,
    pub processed: bool,
}

impl Mention {
    /// Builds a mention from a notification, or `None` for any other notification reason.
    ///
    /// When the mention is itself a reply to somebody else's post, the parent
    /// post's author is the account being asked about.
    pub fn from_notification(notification: &Notification) -> Option<Self> {
        if !notification.is_mention() {
            return None;
        }

        let own = PostRef {
            uri: notification.uri.clone(),
            cid: notification.cid.clone(),
        };

        let target_handle = notification
            .reply
            .as_ref()
            .and_then(|reply| did_from_at_uri(&reply.parent.uri))
            .filter(|did| *did != notification.author_did)
            .map(str::to_string)
            .unwrap_or_else(|| notification.author_handle.clone());

        let root = notification
            .reply
            .as_ref()
            .map(|reply| reply.root.clone())
            .unwrap_or_else(|| own.clone());

        Some(Self {
            id: notification.uri.clone(),
            cid: notification.cid.clone(),
            author_handle: notification.author_handle.clone(),
            target_handle,
            timestamp: notification.indexed_at,
            reply_to: ReplyRef { root, parent: own },
            processed: false,
        })
    }
}

/// Extracts the repository DID from an `at://did/collection/rkey` URI.
pub fn did_from_at_uri(uri: &str) -> Option<&str> {
    let rest = uri.strip_prefix("at://")?;
    let did = rest.split('/').next()?;
    if did.starts_with("did:") {
        Some(did)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub did: String,
    pub handle: String,
    pub display_name: Option<String>,
    pub posts_count: Option<u64>,
}

/// Read-only snapshot of one post from an author feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author_handle: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// False for reposts and replies.
    pub is_original: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedPage {
    pub posts: Vec<Post>,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VibeLabel {
    Encouraging,
    Positive,
    Neutral,
    Critical,
    Hostile,
}

impl VibeLabel {
    pub fn is_negative(self) -> bool {
        matches!(self, VibeLabel::Critical | VibeLabel::Hostile)
    }
}

impl fmt::Display for VibeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            VibeLabel::Encouraging => "Encouraging",
            VibeLabel::Positive => "Positive",
            VibeLabel::Neutral => "Neutral",
            VibeLabel::Critical => "Critical",
            VibeLabel::Hostile => "Hostile",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PersonaLabel {
    Provocateur,
    Enthusiast,
    Curious,
    Teacher,
    Builder,
    Reporter,
    Creator,
    Observer,
    Explorer,
}

impl fmt::Display for PersonaLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PersonaLabel::Provocateur => "Provocateur",
            PersonaLabel::Enthusiast => "Enthusiast",
            PersonaLabel::Curious => "Curious",
            PersonaLabel::Teacher => "Teacher",
            PersonaLabel::Builder => "Builder",
            PersonaLabel::Reporter => "Reporter",
            PersonaLabel::Creator => "Creator",
            PersonaLabel::Observer => "Observer",
            PersonaLabel::Explorer => "Explorer",
        };
        f.write_str(label)
    }
}

/// Content buckets. Declaration order is the tie-break priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentCategory {
    Tech,
    Science,
    Business,
    Finance,
    News,
    Politics,
    Sports,
    Gaming,
    Entertainment,
    Creative,
    Academic,
    Education,
    Health,
    Environment,
    Lifestyle,
    Social,
}

impl ContentCategory {
    pub const ALL: [ContentCategory; 16] = [
        ContentCategory::Tech,
        ContentCategory::Science,
        ContentCategory::Business,
        ContentCategory::Finance,
        ContentCategory::News,
        ContentCategory::Politics,
        ContentCategory::Sports,
        ContentCategory::Gaming,
        ContentCategory::Entertainment,
        ContentCategory::Creative,
        ContentCategory::Academic,
        ContentCategory::Education,
        ContentCategory::Health,
        ContentCategory::Environment,
        ContentCategory::Lifestyle,
        ContentCategory::Social,
    ];

    /// Lowercase topic name, as used in "Posts on tech".
    pub fn topic(self) -> &'static str {
        match self {
            ContentCategory::Tech => "tech",
            ContentCategory::Science => "science",
            ContentCategory::Business => "business",
            ContentCategory::Finance => "finance",
            ContentCategory::News => "news",
            ContentCategory::Politics => "politics",
            ContentCategory::Sports => "sports",
            ContentCategory::Gaming => "gaming",
            ContentCategory::Entertainment => "entertainment",
            ContentCategory::Creative => "creative",
            ContentCategory::Academic => "academic",
            ContentCategory::Education => "education",
            ContentCategory::Health => "health",
            ContentCategory::Environment => "environment",
            ContentCategory::Lifestyle => "lifestyle",
            ContentCategory::Social => "social",
        }
    }

    /// Capitalized feed name, as used in "Add to your Tech Feed."
    pub fn feed_name(self) -> String {
        let topic = self.topic();
        let mut chars = topic.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    pub fn priority(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.topic())
    }
}

/// Verdict for one target account. Produced fresh per mention, consumed once by the formatter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub target_handle: String,
    pub sentiment_score: f64,
    pub vibe_label: VibeLabel,
    pub persona_label: PersonaLabel,
    pub posts_per_day: f64,
    pub originality_ratio: f64,
    pub top_category: Option<ContentCategory>,
    pub recommendation: bool,
    pub low_confidence: bool,
}

/// What happened to the single reply attempt recorded for a processed mention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReplyOutcome {
    Posted { uri: String },
    Failed { reason: String },
}

impl ReplyOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            ReplyOutcome::Posted { .. } => "posted",
            ReplyOutcome::Failed { .. } => "failed",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            ReplyOutcome::Posted { uri } => uri,
            ReplyOutcome::Failed { reason } => reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn notification(reply: Option<ReplyRef>) -> Notification {
        Notification {
            uri: "at://did:plc:asker/app.bsky.feed.post/3k1".to_string(),
            cid: "bafyasker".to_string(),
            reason: "mention".to_string(),
            author_handle: "asker.bsky.social".to_string(),
            author_did: "did:plc:asker".to_string(),
            indexed_at: Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap(),
            reply,
        }
    }

    #[test]
    fn test_mention_targets_author_when_not_a_reply() {
        let mention = Mention::from_notification(&notification(None)).unwrap();
        assert_eq!(mention.target_handle, "asker.bsky.social");
        assert_eq!(mention.reply_to.root, mention.reply_to.parent);
        assert!(!mention.processed);
    }

    #[test]
    fn test_mention_targets_parent_author_when_reply() {
        let reply = ReplyRef {
            root: PostRef {
                uri: "at://did:plc:other/app.bsky.feed.post/root".to_string(),
                cid: "bafyroot".to_string(),
            },
            parent: PostRef {
                uri: "at://did:plc:other/app.bsky.feed.post/parent".to_string(),
                cid: "bafyparent".to_string(),
            },
        };
        let mention = Mention::from_notification(&notification(Some(reply))).unwrap();
        assert_eq!(mention.target_handle, "did:plc:other");
        assert_eq!(mention.reply_to.root.cid, "bafyroot");
        assert_eq!(mention.reply_to.parent.cid, "bafyasker");
    }

    #[test]
    fn test_self_reply_targets_author() {
        let reply = ReplyRef {
            root: PostRef {
                uri: "at://did:plc:asker/app.bsky.feed.post/root".to_string(),
                cid: "bafyroot".to_string(),
            },
            parent: PostRef {
                uri: "at://did:plc:asker/app.bsky.feed.post/parent".to_string(),
                cid: "bafyparent".to_string(),
            },
        };
        let mention = Mention::from_notification(&notification(Some(reply))).unwrap();
        assert_eq!(mention.target_handle, "asker.bsky.social");
    }

    #[test]
    fn test_non_mentions_are_ignored() {
        let mut like = notification(None);
        like.reason = "like".to_string();
        assert!(Mention::from_notification(&like).is_none());
    }

    #[test]
    fn test_did_from_at_uri() {
        assert_eq!(
            did_from_at_uri("at://did:plc:abc/app.bsky.feed.post/xyz"),
            Some("did:plc:abc")
        );
        assert_eq!(did_from_at_uri("at://alice.bsky.social/app.bsky.feed.post/xyz"), None);
        assert_eq!(did_from_at_uri("https://bsky.app"), None);
    }

    #[test]
    fn test_category_names() {
        assert_eq!(ContentCategory::Tech.topic(), "tech");
        assert_eq!(ContentCategory::Environment.feed_name(), "Environment");
        assert!(ContentCategory::Tech.priority() < ContentCategory::Social.priority());
    }
}
