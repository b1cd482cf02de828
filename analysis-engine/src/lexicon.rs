//! Rule tables for the text analyzer.
//!
//! The built-in set is versioned by [`RULES_VERSION`]; bump it whenever a
//! weight, threshold or keyword changes so stored reports can be traced back
//! to the rules that produced them. Deployments may replace the whole set
//! with a TOML rules file (see [`AnalysisRules::load`]).

use reputebot_core::{ConfigError, ContentCategory, PersonaLabel, VibeLabel};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info};

pub const RULES_VERSION: &str = "2026.10.1";

/// Normalization constant for `s / sqrt(s² + α)`.
pub const DEFAULT_NORMALIZATION_ALPHA: f64 = 15.0;

/// Token sentiment weights. Positive in `(0, 4]`, negative in `[-4, 0)`.
const SENTIMENT_LEXICON: &[(&str, f64)] = &[
    // Positive
    ("good", 1.9),
    ("great", 3.1),
    ("excellent", 3.2),
    ("amazing", 2.8),
    ("awesome", 3.1),
    ("fantastic", 2.6),
    ("wonderful", 2.7),
    ("brilliant", 2.8),
    ("incredible", 2.5),
    ("beautiful", 2.9),
    ("perfect", 2.7),
    ("love", 3.2),
    ("loved", 2.9),
    ("loving", 2.9),
    ("like", 1.5),
    ("enjoy", 2.2),
    ("enjoyed", 2.3),
    ("happy", 2.7),
    ("joy", 2.8),
    ("excited", 2.2),
    ("thrilled", 2.6),
    ("grateful", 2.8),
    ("thankful", 2.7),
    ("thanks", 1.9),
    ("thank", 1.5),
    ("blessed", 2.4),
    ("inspired", 2.2),
    ("inspiring", 2.4),
    ("motivated", 1.8),
    ("proud", 2.1),
    ("congrats", 2.4),
    ("congratulations", 2.9),
    ("win", 2.8),
    ("best", 3.2),
    ("fun", 2.3),
    ("nice", 1.8),
    ("cool", 1.3),
    ("helpful", 1.8),
    ("welcome", 2.0),
    ("support", 1.7),
    ("kind", 2.4),
    ("hope", 1.9),
    // Casual positives
    ("lol", 1.2),
    ("haha", 1.2),
    ("omg", 0.8),
    ("wow", 0.8),
    ("lit", 2.8),
    ("fire", 2.8),
    ("slay", 2.4),
    ("queen", 2.0),
    ("king", 2.0),
    ("goals", 1.6),
    ("mood", 0.8),
    ("vibes", 1.2),
    ("heart", 2.4),
    // Negative
    ("bad", -2.5),
    ("terrible", -3.2),
    ("awful", -3.1),
    ("horrible", -3.3),
    ("worst", -3.1),
    ("hate", -3.2),
    ("hated", -3.2),
    ("disgusting", -2.9),
    ("angry", -2.3),
    ("furious", -2.9),
    ("frustrated", -2.2),
    ("frustrating", -2.2),
    ("disappointed", -2.1),
    ("disappointing", -2.2),
    ("sad", -2.1),
    ("depressed", -2.3),
    ("anxious", -1.0),
    ("worried", -1.2),
    ("scared", -1.9),
    ("terrified", -3.0),
    ("devastated", -3.0),
    ("heartbroken", -2.9),
    ("miserable", -2.9),
    ("stupid", -2.4),
    ("idiot", -2.3),
    ("pathetic", -2.6),
    ("trash", -2.2),
    ("garbage", -2.2),
    ("broken", -1.5),
    ("fail", -2.0),
    ("failed", -2.3),
    ("problem", -1.7),
    ("wrong", -2.1),
    ("annoying", -1.7),
    ("boring", -1.3),
    ("kill", -3.2),
    ("die", -2.9),
    // Casual negatives
    ("smh", -1.6),
    ("fml", -3.2),
    ("ugh", -2.0),
    ("sigh", -1.6),
    ("cringe", -2.4),
    ("yikes", -1.2),
    ("oof", -1.2),
    ("bruh", -0.8),
    ("wtf", -2.0),
    ("omfg", -2.4),
];

/// Emoji weights, on the same scale as the lexicon.
const EMOJI_WEIGHTS: &[(&str, f64)] = &[
    ("😀", 2.0),
    ("😃", 2.0),
    ("😄", 2.0),
    ("😁", 2.0),
    ("😆", 2.0),
    ("😅", 2.0),
    ("😂", 2.0),
    ("🤣", 2.0),
    ("😊", 2.0),
    ("😇", 2.0),
    ("🙂", 1.5),
    ("🙃", 1.5),
    ("😉", 1.5),
    ("😌", 1.5),
    ("😍", 1.5),
    ("🥰", 1.5),
    ("😘", 1.5),
    ("😋", 1.0),
    ("😛", 1.0),
    ("😜", 1.0),
    ("🤪", 1.0),
    ("🤓", 1.0),
    ("😎", 1.0),
    ("😔", -1.0),
    ("😟", -1.0),
    ("😕", -1.0),
    ("🙁", -1.0),
    ("😣", -1.0),
    ("😖", -1.0),
    ("😫", -1.0),
    ("😩", -1.0),
    ("🥺", -1.5),
    ("😢", -1.5),
    ("😭", -1.5),
    ("😤", -1.5),
    ("😠", -1.5),
    ("😡", -1.5),
    ("🤬", -1.5),
    ("🤯", -1.5),
    ("😱", -0.5),
    ("😨", -0.5),
    ("😰", -0.5),
    ("😥", -0.5),
    ("😓", -0.5),
    ("😈", -0.75),
    ("👿", -0.75),
    ("💀", -0.75),
    ("☠", -0.75),
    ("💪", 0.75),
    ("👊", 0.75),
    ("👌", 0.75),
    ("👍", 0.75),
    ("👏", 0.75),
    ("🙌", 0.75),
    ("👎", -0.75),
    ("❤", 1.75),
    ("💛", 1.75),
    ("💚", 1.75),
    ("💙", 1.75),
    ("💜", 1.75),
    ("💕", 1.75),
    ("💞", 1.75),
    ("🔥", 1.25),
    ("💯", 1.25),
    ("✨", 1.25),
    ("🌟", 1.25),
    ("⭐", 1.25),
    ("🎉", 1.5),
    ("🎊", 1.5),
    ("🎈", 1.5),
    ("🎂", 1.5),
    ("🎁", 1.5),
];

/// Multipliers applied to the next sentiment-bearing token.
const INTENSIFIERS: &[(&str, f64)] = &[
    ("absolutely", 1.3),
    ("completely", 1.3),
    ("totally", 1.3),
    ("extremely", 1.5),
    ("incredibly", 1.5),
    ("massively", 1.4),
    ("hugely", 1.4),
    ("enormously", 1.4),
    ("dramatically", 1.3),
    ("radically", 1.3),
    ("really", 1.3),
    ("very", 1.3),
    ("super", 1.3),
    ("so", 1.2),
    ("truly", 1.2),
    ("kinda", 0.7),
    ("somewhat", 0.7),
    ("slightly", 0.6),
    ("barely", 0.5),
];

const NEGATORS: &[&str] = &[
    "not", "no", "never", "nothing", "nobody", "neither", "nor", "without", "dont", "don't",
    "doesnt", "doesn't", "didnt", "didn't", "isnt", "isn't", "wasnt", "wasn't", "arent",
    "aren't", "cant", "can't", "cannot", "wont", "won't", "aint", "ain't",
];

/// Multi-word keywords are matched against consecutive tokens.
const CATEGORY_KEYWORDS: &[(ContentCategory, &[&str])] = &[
    (
        ContentCategory::Tech,
        &[
            "code", "programming", "software", "ai", "technology", "developer", "api",
            "database", "algorithm", "javascript", "python", "rust", "react", "cloud",
            "devops", "cybersecurity", "machine learning", "ml", "data science", "backend",
            "frontend", "ios", "android", "kubernetes", "docker", "github", "framework",
            "debugging", "compiler", "open source", "llm",
        ],
    ),
    (
        ContentCategory::Science,
        &[
            "science", "scientific", "experiment", "hypothesis", "discovery", "physics",
            "chemistry", "biology", "astronomy", "geology", "ecology", "laboratory", "lab",
            "scientist", "researcher", "telescope", "molecule", "genome",
        ],
    ),
    (
        ContentCategory::Business,
        &[
            "business", "strategy", "leadership", "entrepreneur", "marketing", "startup",
            "venture capital", "vc", "funding", "pitch deck", "acquisition", "merger", "ipo",
            "roi", "kpi", "sales", "customer", "brand", "advertising", "seo", "hiring",
            "business plan", "founder",
        ],
    ),
    (
        ContentCategory::Finance,
        &[
            "finance", "money", "investment", "investing", "stock", "stocks", "trading",
            "dividend", "bitcoin", "ethereum", "crypto", "nft", "defi", "bank", "loan",
            "mortgage", "retirement", "401k", "tax", "taxes", "salary", "debt",
            "credit score", "inflation",
        ],
    ),
    (
        ContentCategory::News,
        &[
            "news", "breaking", "current events", "report", "announcement", "headline",
            "article", "coverage", "investigation", "exclusive", "journalist", "reporter",
            "press",
        ],
    ),
    (
        ContentCategory::Politics,
        &[
            "politics", "political", "government", "policy", "legislation", "election",
            "vote", "voting", "candidate", "politician", "senator", "president", "governor",
            "congress", "senate", "parliament", "democracy", "constitution", "liberal",
            "conservative", "republican", "democrat",
        ],
    ),
    (
        ContentCategory::Sports,
        &[
            "sports", "basketball", "football", "soccer", "baseball", "athlete", "coach",
            "nfl", "nba", "mlb", "nhl", "tennis", "golf", "olympics", "championship",
            "playoff", "playoffs", "quarterback", "touchdown", "home run", "free throw",
            "grand slam",
        ],
    ),
    (
        ContentCategory::Gaming,
        &[
            "game", "gaming", "video game", "console", "playstation", "xbox", "nintendo",
            "rpg", "fps", "mmo", "esports", "speedrun", "multiplayer", "twitch", "dlc",
            "steam", "boss fight",
        ],
    ),
    (
        ContentCategory::Entertainment,
        &[
            "movie", "movies", "tv", "television", "series", "episode", "premiere",
            "finale", "actor", "actress", "oscar", "emmy", "grammy", "golden globe",
            "red carpet", "box office", "trailer", "netflix", "hbo", "podcast",
            "streaming", "documentary",
        ],
    ),
    (
        ContentCategory::Creative,
        &[
            "art", "design", "creative", "music", "film", "photography", "writing",
            "poetry", "illustration", "animation", "painting", "drawing", "sculpture",
            "digital art", "graphic design", "typography", "gallery", "exhibition",
            "portfolio", "album", "song",
        ],
    ),
    (
        ContentCategory::Academic,
        &[
            "research", "study", "theory", "paper", "conference", "journal", "phd",
            "thesis", "dissertation", "peer review", "citation", "literature review",
            "academic", "scholarly", "postdoc", "preprint",
        ],
    ),
    (
        ContentCategory::Education,
        &[
            "education", "learning", "teaching", "school", "university", "college",
            "course", "class", "lecture", "student", "students", "teacher", "professor",
            "tutor", "curriculum", "homework", "exam", "classroom", "tutorial",
        ],
    ),
    (
        ContentCategory::Health,
        &[
            "health", "medical", "doctor", "nurse", "clinic", "hospital", "diagnosis",
            "treatment", "therapy", "medication", "surgery", "recovery", "symptom",
            "disease", "mental health", "psychology", "anxiety", "depression", "adhd",
            "vaccine",
        ],
    ),
    (
        ContentCategory::Environment,
        &[
            "environment", "climate", "climate change", "global warming", "sustainability",
            "renewable", "solar", "emissions", "carbon", "pollution", "recycling",
            "wildlife", "conservation", "extinction", "ecosystem", "biodiversity",
        ],
    ),
    (
        ContentCategory::Lifestyle,
        &[
            "lifestyle", "fitness", "food", "travel", "wellness", "recipe", "workout",
            "meditation", "self-care", "nutrition", "vegan", "gym", "yoga", "running",
            "fashion", "outfit", "skincare", "makeup", "cooking", "coffee",
        ],
    ),
    (
        ContentCategory::Social,
        &[
            "community", "social", "friends", "family", "networking", "connection",
            "conversation", "meetup", "gathering", "celebration", "mentorship",
            "volunteer", "charity", "donation", "advocacy", "activism", "solidarity",
        ],
    ),
];

/// One vibe band: the label applies when the aggregate score is above
/// `above` (or at it, when `inclusive`). Bands are checked in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VibeBand {
    pub label: VibeLabel,
    pub above: f64,
    #[serde(default)]
    pub inclusive: bool,
}

impl VibeBand {
    pub fn matches(&self, score: f64) -> bool {
        if self.inclusive {
            score >= self.above
        } else {
            score > self.above
        }
    }
}

/// Conjunction of optional conditions; an empty condition always matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaCondition {
    pub vibes: Vec<VibeLabel>,
    pub categories: Vec<ContentCategory>,
    pub min_sentiment: Option<f64>,
    pub max_sentiment: Option<f64>,
    pub min_question_rate: Option<f64>,
    pub min_exclamation_rate: Option<f64>,
    pub min_caps_ratio: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaRule {
    pub label: PersonaLabel,
    #[serde(default)]
    pub when: PersonaCondition,
}

impl PersonaRule {
    fn new(label: PersonaLabel, when: PersonaCondition) -> Self {
        Self { label, when }
    }
}

/// Every table the analyzer reads. Pure data; the analyzer holds no state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisRules {
    pub version: String,
    pub normalization_alpha: f64,
    pub lexicon: HashMap<String, f64>,
    pub emoji: HashMap<String, f64>,
    pub intensifiers: HashMap<String, f64>,
    pub negators: Vec<String>,
    /// How many tokens a pending intensifier or negator stays armed.
    pub modifier_scope: usize,
    pub vibe_bands: Vec<VibeBand>,
    pub fallback_vibe: VibeLabel,
    pub category_keywords: BTreeMap<ContentCategory, Vec<String>>,
    pub persona_rules: Vec<PersonaRule>,
    pub default_persona: PersonaLabel,
}

impl Default for AnalysisRules {
    fn default() -> Self {
        let owned = |table: &[(&str, f64)]| -> HashMap<String, f64> {
            table
                .iter()
                .map(|(token, weight)| (token.to_string(), *weight))
                .collect()
        };

        Self {
            version: RULES_VERSION.to_string(),
            normalization_alpha: DEFAULT_NORMALIZATION_ALPHA,
            lexicon: owned(SENTIMENT_LEXICON),
            emoji: owned(EMOJI_WEIGHTS),
            intensifiers: owned(INTENSIFIERS),
            negators: NEGATORS.iter().map(|word| word.to_string()).collect(),
            modifier_scope: 3,
            vibe_bands: default_vibe_bands(),
            fallback_vibe: VibeLabel::Hostile,
            category_keywords: CATEGORY_KEYWORDS
                .iter()
                .map(|(category, keywords)| {
                    (
                        *category,
                        keywords.iter().map(|keyword| keyword.to_string()).collect(),
                    )
                })
                .collect(),
            persona_rules: default_persona_rules(),
            default_persona: PersonaLabel::Explorer,
        }
    }
}

fn default_vibe_bands() -> Vec<VibeBand> {
    vec![
        VibeBand {
            label: VibeLabel::Encouraging,
            above: 0.5,
            inclusive: true,
        },
        VibeBand {
            label: VibeLabel::Positive,
            above: 0.15,
            inclusive: true,
        },
        VibeBand {
            label: VibeLabel::Neutral,
            above: -0.15,
            inclusive: false,
        },
        VibeBand {
            label: VibeLabel::Critical,
            above: -0.5,
            inclusive: false,
        },
    ]
}

fn default_persona_rules() -> Vec<PersonaRule> {
    vec![
        PersonaRule::new(
            PersonaLabel::Provocateur,
            PersonaCondition {
                vibes: vec![VibeLabel::Critical, VibeLabel::Hostile],
                min_caps_ratio: Some(0.2),
                ..Default::default()
            },
        ),
        PersonaRule::new(
            PersonaLabel::Provocateur,
            PersonaCondition {
                vibes: vec![VibeLabel::Hostile],
                ..Default::default()
            },
        ),
        PersonaRule::new(
            PersonaLabel::Enthusiast,
            PersonaCondition {
                vibes: vec![VibeLabel::Encouraging],
                min_exclamation_rate: Some(1.0),
                ..Default::default()
            },
        ),
        PersonaRule::new(
            PersonaLabel::Teacher,
            PersonaCondition {
                categories: vec![
                    ContentCategory::Education,
                    ContentCategory::Academic,
                    ContentCategory::Science,
                ],
                min_sentiment: Some(0.0),
                ..Default::default()
            },
        ),
        PersonaRule::new(
            PersonaLabel::Curious,
            PersonaCondition {
                min_question_rate: Some(0.5),
                ..Default::default()
            },
        ),
        PersonaRule::new(
            PersonaLabel::Builder,
            PersonaCondition {
                categories: vec![
                    ContentCategory::Tech,
                    ContentCategory::Business,
                    ContentCategory::Finance,
                ],
                ..Default::default()
            },
        ),
        PersonaRule::new(
            PersonaLabel::Builder,
            PersonaCondition {
                min_caps_ratio: Some(0.15),
                min_exclamation_rate: Some(1.0),
                ..Default::default()
            },
        ),
        PersonaRule::new(
            PersonaLabel::Reporter,
            PersonaCondition {
                categories: vec![
                    ContentCategory::News,
                    ContentCategory::Politics,
                    ContentCategory::Sports,
                ],
                ..Default::default()
            },
        ),
        PersonaRule::new(
            PersonaLabel::Creator,
            PersonaCondition {
                categories: vec![
                    ContentCategory::Creative,
                    ContentCategory::Entertainment,
                    ContentCategory::Gaming,
                ],
                ..Default::default()
            },
        ),
        PersonaRule::new(
            PersonaLabel::Observer,
            PersonaCondition {
                vibes: vec![VibeLabel::Neutral],
                ..Default::default()
            },
        ),
    ]
}

impl AnalysisRules {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let rules: AnalysisRules = toml::from_str(content)?;
        rules.validate()?;
        Ok(rules)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
                path: path.display().to_string(),
            })?;
        let rules = Self::from_toml_str(&content)?;
        info!(
            "Loaded analysis rules {} from {} ({} lexicon entries)",
            rules.version,
            path.display(),
            rules.lexicon.len()
        );
        Ok(rules)
    }

    /// Built-in rules unless a rules file is configured.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                debug!("Using built-in analysis rules {}", RULES_VERSION);
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.normalization_alpha.is_nan() || self.normalization_alpha <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "normalization_alpha".to_string(),
                value: self.normalization_alpha.to_string(),
            });
        }
        if self.vibe_bands.is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "at least one vibe band is required".to_string(),
            });
        }
        if self
            .vibe_bands
            .windows(2)
            .any(|pair| pair[1].above > pair[0].above)
        {
            return Err(ConfigError::ValidationFailed {
                reason: "vibe bands must be ordered from highest to lowest threshold"
                    .to_string(),
            });
        }
        Ok(())
    }

    pub fn vibe_for(&self, score: f64) -> VibeLabel {
        self.vibe_bands
            .iter()
            .find(|band| band.matches(score))
            .map(|band| band.label)
            .unwrap_or(self.fallback_vibe)
    }

    pub fn is_negator(&self, token: &str) -> bool {
        self.negators.iter().any(|negator| negator == token)
    }
}
