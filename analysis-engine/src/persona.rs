use crate::analyzer::StyleSignals;
use crate::lexicon::{AnalysisRules, PersonaCondition};
use reputebot_core::{ContentCategory, PersonaLabel, VibeLabel};

/// Everything a persona rule may look at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PersonaSignals {
    pub sentiment_score: f64,
    pub vibe_label: VibeLabel,
    pub top_category: Option<ContentCategory>,
    pub style: StyleSignals,
}

/// First matching rule wins; the default persona otherwise.
pub fn classify(signals: &PersonaSignals, rules: &AnalysisRules) -> PersonaLabel {
    rules
        .persona_rules
        .iter()
        .find(|rule| matches(&rule.when, signals))
        .map(|rule| rule.label)
        .unwrap_or(rules.default_persona)
}

fn matches(condition: &PersonaCondition, signals: &PersonaSignals) -> bool {
    if !condition.vibes.is_empty() && !condition.vibes.contains(&signals.vibe_label) {
        return false;
    }
    if !condition.categories.is_empty() {
        match signals.top_category {
            Some(category) if condition.categories.contains(&category) => {}
            _ => return false,
        }
    }

    at_least(signals.sentiment_score, condition.min_sentiment)
        && condition
            .max_sentiment
            .map_or(true, |max| signals.sentiment_score <= max)
        && at_least(signals.style.question_rate, condition.min_question_rate)
        && at_least(signals.style.exclamation_rate, condition.min_exclamation_rate)
        && at_least(signals.style.caps_ratio, condition.min_caps_ratio)
}

fn at_least(value: f64, min: Option<f64>) -> bool {
    min.map_or(true, |min| value >= min)
}
