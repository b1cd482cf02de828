use crate::error::*;
use std::time::Duration;
use tracing::{error, info, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn is_retryable(&self) -> bool;
    fn retry_after(&self) -> Option<Duration>;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl CoreError {
    /// True for errors that mean the bot's session can no longer be used.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            CoreError::Platform(
                PlatformApiError::AuthenticationFailed { .. } | PlatformApiError::InvalidToken
            )
        )
    }

    pub fn is_insufficient_data(&self) -> bool {
        matches!(
            self,
            CoreError::Analysis(AnalysisError::InsufficientData { .. })
        )
    }
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::Platform(e) => {
                error!("Platform API error details: {:?}", e);
            }
            CoreError::Database(e) => {
                error!("Database error details: {:?}", e);
            }
            CoreError::Analysis(e) => {
                error!("Analysis error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::Platform(e) => e.is_retryable(),
            CoreError::Database(e) => e.is_retryable(),
            CoreError::Network(_) => true,
            CoreError::Timeout { .. } => true,
            CoreError::RateLimitExceeded { .. } => true,
            CoreError::Transient { .. } => true,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::Platform(e) => e.retry_after(),
            CoreError::Database(e) => e.retry_after(),
            CoreError::Timeout { seconds } => Some(Duration::from_secs(*seconds)),
            _ if self.is_retryable() => Some(Duration::from_secs(5)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::Platform(e) => e.user_friendly_message(),
            CoreError::Database(e) => e.user_friendly_message(),
            CoreError::Analysis(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Network(_) => {
                "Network connection error. Please check your internet connection.".to_string()
            }
            CoreError::Timeout { .. } => {
                "The operation took too long to complete. Please try again.".to_string()
            }
            CoreError::RateLimitExceeded { request, attempts } => format!(
                "Still rate limited on {} after {} attempts. The mention will be retried later.",
                request, attempts
            ),
            CoreError::Transient { request, .. } => format!(
                "Temporary failure talking to the platform ({}). The mention will be retried later.",
                request
            ),
            CoreError::QueueClosed => "The bot is shutting down.".to_string(),
            _ => "An unexpected error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::Platform(_) => "PLATFORM_API".to_string(),
            CoreError::Database(_) => "DATABASE".to_string(),
            CoreError::Analysis(_) => "ANALYSIS".to_string(),
            CoreError::Config(_) => "CONFIG".to_string(),
            CoreError::Network(_) => "NETWORK".to_string(),
            CoreError::Timeout { .. } => "TIMEOUT".to_string(),
            CoreError::Internal { .. } => "INTERNAL".to_string(),
            CoreError::RateLimitExceeded { .. } => "RATE_LIMITED".to_string(),
            CoreError::Transient { .. } => "TRANSIENT".to_string(),
            CoreError::QueueClosed => "QUEUE_CLOSED".to_string(),
        }
    }
}

impl ErrorExt for PlatformApiError {
    fn log_error(&self) -> &Self {
        error!("PlatformApiError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("PlatformApiError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            PlatformApiError::RateLimitExceeded { .. } => true,
            PlatformApiError::RequestTimeout => true,
            PlatformApiError::ServerError { status_code } => *status_code >= 500,
            PlatformApiError::EndpointUnavailable { .. } => true,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            PlatformApiError::RateLimitExceeded {
                retry_after: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            _ if self.is_retryable() => Some(Duration::from_secs(30)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            PlatformApiError::AuthenticationFailed { .. } => {
                "Bluesky authentication failed. Please check the bot handle and app password."
                    .to_string()
            }
            PlatformApiError::RateLimitExceeded { retry_after } => match retry_after {
                Some(secs) => format!(
                    "Too many requests. Please wait {} seconds before trying again.",
                    secs
                ),
                None => "Too many requests. Please wait before trying again.".to_string(),
            },
            PlatformApiError::Forbidden { resource } => format!(
                "Access denied to {}. The account may be private or blocking the bot.",
                resource
            ),
            PlatformApiError::ActorNotFound { actor } => {
                format!("Account '{}' not found or deactivated.", actor)
            }
            PlatformApiError::PostNotFound { .. } => {
                "The requested post could not be found.".to_string()
            }
            PlatformApiError::InvalidToken => {
                "Bluesky session token is invalid. Please re-authenticate.".to_string()
            }
            PlatformApiError::RequestTimeout => {
                "Request to Bluesky timed out. Please try again.".to_string()
            }
            _ => "Bluesky API error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            PlatformApiError::AuthenticationFailed { .. } => "BSKY_AUTH_FAILED".to_string(),
            PlatformApiError::RateLimitExceeded { .. } => "BSKY_RATE_LIMIT".to_string(),
            PlatformApiError::Forbidden { .. } => "BSKY_FORBIDDEN".to_string(),
            PlatformApiError::ActorNotFound { .. } => "BSKY_ACTOR_NOT_FOUND".to_string(),
            PlatformApiError::PostNotFound { .. } => "BSKY_POST_NOT_FOUND".to_string(),
            PlatformApiError::InvalidToken => "BSKY_INVALID_TOKEN".to_string(),
            PlatformApiError::EndpointUnavailable { .. } => {
                "BSKY_ENDPOINT_UNAVAILABLE".to_string()
            }
            PlatformApiError::RequestTimeout => "BSKY_TIMEOUT".to_string(),
            PlatformApiError::InvalidResponse { .. } => "BSKY_INVALID_RESPONSE".to_string(),
            PlatformApiError::BadRequest { .. } => "BSKY_BAD_REQUEST".to_string(),
            PlatformApiError::ServerError { .. } => "BSKY_SERVER_ERROR".to_string(),
        }
    }
}

impl ErrorExt for DatabaseError {
    fn log_error(&self) -> &Self {
        error!("DatabaseError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("DatabaseError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            DatabaseError::DatabaseLocked | DatabaseError::ConnectionFailed { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            DatabaseError::DatabaseLocked => Some(Duration::from_millis(100)),
            _ if self.is_retryable() => Some(Duration::from_secs(1)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            DatabaseError::ConnectionFailed { .. } => {
                "Ledger database connection failed. Please try again.".to_string()
            }
            DatabaseError::DatabaseLocked => {
                "Ledger database is temporarily busy. Please try again.".to_string()
            }
            DatabaseError::UnknownMention { mention_id } => {
                format!("Mention '{}' is not in the ledger.", mention_id)
            }
            _ => "Database error occurred. Please try again.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            DatabaseError::ConnectionFailed { .. } => "DB_CONNECTION_FAILED".to_string(),
            DatabaseError::MigrationFailed { .. } => "DB_MIGRATION_FAILED".to_string(),
            DatabaseError::QueryFailed { .. } => "DB_QUERY_FAILED".to_string(),
            DatabaseError::DatabaseLocked => "DB_LOCKED".to_string(),
            DatabaseError::UnknownMention { .. } => "DB_UNKNOWN_MENTION".to_string(),
            DatabaseError::Sql(_) => "DB_SQL_ERROR".to_string(),
        }
    }
}

impl ErrorExt for AnalysisError {
    fn log_error(&self) -> &Self {
        error!("AnalysisError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("AnalysisError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            AnalysisError::InsufficientData { .. } => {
                "Not enough recent posts to say much about this account.".to_string()
            }
            AnalysisError::InvalidWindow { days } => {
                format!("An activity window of {} days is not valid.", days)
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            AnalysisError::InsufficientData { .. } => "ANALYSIS_INSUFFICIENT_DATA".to_string(),
            AnalysisError::InvalidWindow { .. } => "ANALYSIS_INVALID_WINDOW".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ConfigError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("Configuration file '{}' not found.", path)
            }
            ConfigError::MissingField { field } => {
                format!("Required configuration field '{}' is missing.", field)
            }
            ConfigError::InvalidValue { field, .. } => {
                format!("Invalid value for configuration field '{}'.", field)
            }
            ConfigError::MissingEnvironmentVariable { var_name } => format!(
                "Environment variable '{}' is required but not set.",
                var_name
            ),
            ConfigError::Parse(_) => {
                "Configuration file format is invalid. Please check the settings.".to_string()
            }
            _ => "Configuration error occurred. Please check your settings.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND".to_string(),
            ConfigError::MissingField { .. } => "CONFIG_MISSING_FIELD".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::MissingEnvironmentVariable { .. } => "CONFIG_MISSING_ENV_VAR".to_string(),
            ConfigError::ValidationFailed { .. } => "CONFIG_VALIDATION_FAILED".to_string(),
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR".to_string(),
        }
    }
}

pub struct ErrorReporter {
    report_errors: bool,
    report_warnings: bool,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self {
            report_errors: true,
            report_warnings: true,
        }
    }

    pub fn with_error_reporting(mut self, enabled: bool) -> Self {
        self.report_errors = enabled;
        self
    }

    pub fn with_warning_reporting(mut self, enabled: bool) -> Self {
        self.report_warnings = enabled;
        self
    }

    pub fn report_error(&self, error: &CoreError) {
        if self.report_errors {
            error.log_error();
            info!("Error code: {}", error.error_code());
            info!("User message: {}", error.user_friendly_message());
            if error.is_retryable() {
                if let Some(retry_after) = error.retry_after() {
                    info!("Error is retryable. Retry after: {:?}", retry_after);
                }
            }
        }
    }

    pub fn report_warning(&self, error: &CoreError) {
        if self.report_warnings {
            error.log_warn();
        }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}
