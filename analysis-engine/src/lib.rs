pub mod activity;
pub mod analyzer;
pub mod formatter;
pub mod lexicon;
pub mod persona;
pub mod text;

pub use activity::{estimate, estimate_at, window_start, ActivityEstimate};
pub use analyzer::{analyze, analyze_texts, score_post, StyleSignals, TextAnalysis};
pub use formatter::{format, format_insufficient, truncate_reply};
pub use lexicon::{AnalysisRules, PersonaCondition, PersonaRule, VibeBand, RULES_VERSION};
pub use persona::{classify, PersonaSignals};

use chrono::{DateTime, Utc};
use reputebot_core::{AnalysisError, AnalysisResult, AnalysisSettings, ConfigError, Post};
use tracing::debug;

/// Fewer scorable posts than this marks a result as low confidence.
const MIN_CONFIDENT_POSTS: usize = 3;

/// Turns a target's recent posts into an [`AnalysisResult`].
#[derive(Debug, Clone)]
pub struct AnalysisEngine {
    rules: AnalysisRules,
    window_days: u32,
    recommend_threshold: f64,
}

impl AnalysisEngine {
    pub fn new(rules: AnalysisRules, settings: &AnalysisSettings) -> Self {
        Self {
            rules,
            window_days: settings.window_days,
            recommend_threshold: settings.recommend_threshold,
        }
    }

    /// Loads the configured rules file, or the built-in rules.
    pub fn from_settings(settings: &AnalysisSettings) -> Result<Self, ConfigError> {
        let rules = AnalysisRules::load_or_default(settings.rules_file.as_deref())?;
        Ok(Self::new(rules, settings))
    }

    pub fn rules(&self) -> &AnalysisRules {
        &self.rules
    }

    pub fn window_days(&self) -> u32 {
        self.window_days
    }

    pub fn evaluate(
        &self,
        target_handle: &str,
        posts: &[Post],
    ) -> Result<AnalysisResult, AnalysisError> {
        self.evaluate_at(target_handle, posts, Utc::now())
    }

    /// Estimates activity over the window, then analyzes the text of the
    /// posts inside it.
    pub fn evaluate_at(
        &self,
        target_handle: &str,
        posts: &[Post],
        now: DateTime<Utc>,
    ) -> Result<AnalysisResult, AnalysisError> {
        let activity = estimate_at(posts, self.window_days, now)?;
        let start = window_start(self.window_days, now)?;
        let recent: Vec<Post> = posts
            .iter()
            .filter(|post| post.timestamp >= start && post.timestamp <= now)
            .cloned()
            .collect();

        let text = analyze(&recent, &self.rules)?;
        let recommendation =
            text.sentiment_score >= self.recommend_threshold && !text.vibe_label.is_negative();

        debug!(
            "{}: {} posts in window, {:.2}/day, originality {:.2}, recommend={}",
            target_handle,
            activity.posts_in_window,
            activity.posts_per_day,
            activity.originality_ratio,
            recommendation
        );

        Ok(AnalysisResult {
            target_handle: target_handle.to_string(),
            sentiment_score: text.sentiment_score,
            vibe_label: text.vibe_label,
            persona_label: text.persona_label,
            posts_per_day: activity.posts_per_day,
            originality_ratio: activity.originality_ratio,
            top_category: text.top_category,
            recommendation,
            low_confidence: activity.low_confidence || text.scored_posts < MIN_CONFIDENT_POSTS,
        })
    }
}
