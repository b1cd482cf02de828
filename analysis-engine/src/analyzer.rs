use crate::lexicon::AnalysisRules;
use crate::persona::{classify, PersonaSignals};
use crate::text;
use reputebot_core::{AnalysisError, ContentCategory, PersonaLabel, Post, VibeLabel};
use std::collections::BTreeMap;
use tracing::debug;

/// Writing-style signals averaged over the scorable posts.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StyleSignals {
    /// Question marks per post.
    pub question_rate: f64,
    /// Exclamation marks per post.
    pub exclamation_rate: f64,
    /// Uppercase letters over all letters.
    pub caps_ratio: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextAnalysis {
    pub sentiment_score: f64,
    pub vibe_label: VibeLabel,
    pub top_category: Option<ContentCategory>,
    pub persona_label: PersonaLabel,
    pub category_hits: BTreeMap<ContentCategory, usize>,
    pub style: StyleSignals,
    pub scored_posts: usize,
}

/// Analyzes the text of a batch of posts. Posts with no text left after
/// cleaning are skipped; with nothing left to score this is `InsufficientData`.
pub fn analyze(posts: &[Post], rules: &AnalysisRules) -> Result<TextAnalysis, AnalysisError> {
    let texts: Vec<&str> = posts.iter().map(|post| post.text.as_str()).collect();
    analyze_texts(&texts, rules)
}

pub fn analyze_texts<S: AsRef<str>>(
    texts: &[S],
    rules: &AnalysisRules,
) -> Result<TextAnalysis, AnalysisError> {
    let mut scores = Vec::with_capacity(texts.len());
    let mut category_hits: BTreeMap<ContentCategory, usize> = BTreeMap::new();
    let mut questions = 0usize;
    let mut exclamations = 0usize;
    let mut styled = String::new();

    for raw in texts {
        let stripped = text::strip_noise(raw.as_ref());
        if stripped.is_empty() {
            continue;
        }
        let cleaned = stripped.to_lowercase().replace('\u{2019}', "'");
        let tokens = text::tokenize(&cleaned);

        scores.push(score_tokens(&tokens, &cleaned, rules));
        count_categories(&tokens, rules, &mut category_hits);

        questions += stripped.matches('?').count();
        exclamations += stripped.matches('!').count();
        styled.push_str(&stripped);
        styled.push(' ');
    }

    if scores.is_empty() {
        return Err(AnalysisError::InsufficientData { scorable_posts: 0 });
    }

    let scored_posts = scores.len();
    let sentiment_score = (scores.iter().sum::<f64>() / scored_posts as f64).clamp(-1.0, 1.0);
    let vibe_label = rules.vibe_for(sentiment_score);
    let top_category = top_category(&category_hits);
    let style = StyleSignals {
        question_rate: questions as f64 / scored_posts as f64,
        exclamation_rate: exclamations as f64 / scored_posts as f64,
        caps_ratio: text::caps_ratio(&styled),
    };
    let persona_label = classify(
        &PersonaSignals {
            sentiment_score,
            vibe_label,
            top_category,
            style,
        },
        rules,
    );

    debug!(
        "Analyzed {} posts: sentiment={:.3} vibe={} category={:?} persona={}",
        scored_posts, sentiment_score, vibe_label, top_category, persona_label
    );

    Ok(TextAnalysis {
        sentiment_score,
        vibe_label,
        top_category,
        persona_label,
        category_hits,
        style,
        scored_posts,
    })
}

/// Sentiment of a single post in `(-1, 1)`, or `None` when nothing is left after cleaning.
pub fn score_post(raw: &str, rules: &AnalysisRules) -> Option<f64> {
    let cleaned = text::clean(raw);
    if cleaned.is_empty() {
        return None;
    }
    let tokens = text::tokenize(&cleaned);
    Some(score_tokens(&tokens, &cleaned, rules))
}

/// Squashes an unbounded sum into `(-1, 1)`.
pub fn normalize(sum: f64, alpha: f64) -> f64 {
    if sum == 0.0 {
        return 0.0;
    }
    sum / (sum * sum + alpha).sqrt()
}

fn score_tokens(tokens: &[&str], cleaned: &str, rules: &AnalysisRules) -> f64 {
    let mut sum = 0.0;
    let mut modifier = 1.0;
    let mut armed = 0usize;

    for token in tokens {
        if let Some(weight) = rules.lexicon.get(*token) {
            sum += weight * modifier;
            modifier = 1.0;
            armed = 0;
        } else if let Some(factor) = rules.intensifiers.get(*token) {
            modifier *= factor;
            armed = rules.modifier_scope;
        } else if rules.is_negator(token) {
            modifier = -modifier;
            armed = rules.modifier_scope;
        } else if armed > 0 {
            armed -= 1;
            if armed == 0 {
                modifier = 1.0;
            }
        }
    }

    let mut buf = [0u8; 4];
    for c in text::emoji_chars(cleaned) {
        if let Some(weight) = rules.emoji.get(c.encode_utf8(&mut buf) as &str) {
            sum += weight;
        }
    }

    normalize(sum, rules.normalization_alpha)
}

fn count_categories(
    tokens: &[&str],
    rules: &AnalysisRules,
    hits: &mut BTreeMap<ContentCategory, usize>,
) {
    for (category, keywords) in &rules.category_keywords {
        let mut count = 0;
        for keyword in keywords {
            let parts: Vec<&str> = keyword.split_whitespace().collect();
            count += match parts.len() {
                0 => 0,
                1 => tokens.iter().filter(|token| **token == parts[0]).count(),
                n => tokens.windows(n).filter(|window| *window == parts.as_slice()).count(),
            };
        }
        if count > 0 {
            *hits.entry(*category).or_insert(0) += count;
        }
    }
}

/// Highest hit count wins; ties go to the earlier category.
fn top_category(hits: &BTreeMap<ContentCategory, usize>) -> Option<ContentCategory> {
    let mut best: Option<(ContentCategory, usize)> = None;
    for (category, count) in hits {
        if *count == 0 {
            continue;
        }
        match best {
            Some((_, best_count)) if best_count >= *count => {}
            _ => best = Some((*category, *count)),
        }
    }
    best.map(|(category, _)| category)
}
