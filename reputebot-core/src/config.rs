use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Top level bot configuration, loaded from TOML. Every field has a default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub bluesky: BlueskyConfig,
    pub polling: PollingConfig,
    pub rate_limit: RateLimitSettings,
    pub retry: RetrySettings,
    pub analysis: AnalysisSettings,
    pub database: DatabaseSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlueskyConfig {
    pub service_url: String,
    /// Bot handle. Falls back to `handle_env` when unset.
    pub handle: Option<String>,
    pub handle_env: String,
    pub password_env: String,
}

impl Default for BlueskyConfig {
    fn default() -> Self {
        Self {
            service_url: "https://bsky.social".to_string(),
            handle: None,
            handle_env: "BLUESKY_HANDLE".to_string(),
            password_env: "BLUESKY_APP_PASSWORD".to_string(),
        }
    }
}

impl BlueskyConfig {
    /// Resolves the bot's handle and app password from config and environment.
    pub fn credentials(&self) -> Result<(String, String), ConfigError> {
        let handle = match &self.handle {
            Some(handle) if !handle.trim().is_empty() => handle.trim().to_string(),
            _ => read_env(&self.handle_env)?,
        };
        let password = read_env(&self.password_env)?;
        Ok((handle, password))
    }
}

fn read_env(var_name: &str) -> Result<String, ConfigError> {
    match std::env::var(var_name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::MissingEnvironmentVariable {
            var_name: var_name.to_string(),
        }),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_secs: u64,
    pub error_backoff_secs: u64,
    pub notification_limit: u32,
    /// Mentions older than this are ignored.
    pub max_mention_age_secs: u64,
    pub max_concurrent_mentions: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            error_backoff_secs: 60,
            notification_limit: 50,
            max_mention_age_secs: 2 * 60 * 60,
            max_concurrent_mentions: 4,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    pub fn max_mention_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_mention_age_secs as i64)
    }
}

/// Request kinds that can carry their own call budget.
pub const RATE_LIMITED_ENDPOINTS: [&str; 5] = [
    "list_notifications",
    "get_profile",
    "get_author_feed",
    "post_reply",
    "mark_seen",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointLimit {
    pub max_calls: u32,
    pub window_secs: u64,
}

impl EndpointLimit {
    pub const fn per_minute(max_calls: u32) -> Self {
        Self {
            max_calls,
            window_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Account-wide budget shared by every request kind.
    pub window_secs: u64,
    pub max_calls_per_window: u32,
    pub request_timeout_secs: u64,
    /// Extra per-kind budgets, keyed by request kind. A table given in the
    /// config file replaces the defaults as a whole.
    pub endpoints: BTreeMap<String, EndpointLimit>,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        let endpoints = [
            ("post_reply", EndpointLimit::per_minute(10)),
            ("list_notifications", EndpointLimit::per_minute(30)),
            ("get_author_feed", EndpointLimit::per_minute(20)),
            ("get_profile", EndpointLimit::per_minute(30)),
            ("mark_seen", EndpointLimit::per_minute(50)),
        ]
        .into_iter()
        .map(|(kind, limit)| (kind.to_string(), limit))
        .collect();

        Self {
            window_secs: 300,
            max_calls_per_window: 3000,
            request_timeout_secs: 30,
            endpoints,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub throttle_base_delay_ms: u64,
    pub throttle_max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub transient_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            throttle_base_delay_ms: 1000,
            throttle_max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
            transient_delay_ms: 2000,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub window_days: u32,
    pub max_posts: usize,
    pub page_size: u32,
    pub reply_max_chars: usize,
    pub recommend_threshold: f64,
    /// Optional TOML file replacing the built-in rule tables.
    pub rules_file: Option<PathBuf>,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            window_days: 30,
            max_posts: 1000,
            page_size: 20,
            reply_max_chars: 300,
            recommend_threshold: 0.1,
            rules_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite://reputebot.db".to_string(),
        }
    }
}

impl BotConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: BotConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
                path: path.display().to_string(),
            })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        debug!("Configuration: {:?}", config);
        Ok(config)
    }

    /// Uses the file when given, built-in defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                info!("No configuration file given, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.window_secs == 0 {
            return Err(invalid("rate_limit.window_secs", self.rate_limit.window_secs));
        }
        if self.rate_limit.max_calls_per_window == 0 {
            return Err(invalid(
                "rate_limit.max_calls_per_window",
                self.rate_limit.max_calls_per_window,
            ));
        }
        if self.rate_limit.request_timeout_secs == 0 {
            return Err(invalid(
                "rate_limit.request_timeout_secs",
                self.rate_limit.request_timeout_secs,
            ));
        }
        for (kind, limit) in &self.rate_limit.endpoints {
            if !RATE_LIMITED_ENDPOINTS.contains(&kind.as_str()) {
                return Err(invalid("rate_limit.endpoints", kind));
            }
            if limit.max_calls == 0 || limit.window_secs == 0 {
                return Err(invalid(
                    &format!("rate_limit.endpoints.{kind}"),
                    format!("{}/{}s", limit.max_calls, limit.window_secs),
                ));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", self.retry.max_attempts));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(invalid(
                "retry.backoff_multiplier",
                self.retry.backoff_multiplier,
            ));
        }
        if self.analysis.window_days == 0 {
            return Err(invalid("analysis.window_days", self.analysis.window_days));
        }
        if self.analysis.page_size == 0 || self.analysis.page_size > 100 {
            return Err(invalid("analysis.page_size", self.analysis.page_size));
        }
        if self.analysis.reply_max_chars < 4 {
            return Err(invalid(
                "analysis.reply_max_chars",
                self.analysis.reply_max_chars,
            ));
        }
        if self.polling.interval_secs == 0 {
            return Err(invalid("polling.interval_secs", self.polling.interval_secs));
        }
        if self.polling.max_concurrent_mentions == 0 {
            return Err(invalid(
                "polling.max_concurrent_mentions",
                self.polling.max_concurrent_mentions,
            ));
        }
        if self.bluesky.service_url.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "bluesky.service_url".to_string(),
            });
        }
        Ok(())
    }
}

fn invalid(field: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}
