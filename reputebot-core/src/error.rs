use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Platform API error: {0}")]
    Platform(#[from] PlatformApiError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Operation timeout after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Internal error: {message}")]
    Internal { message: String },

    /// The queue gave up on a request after repeated throttling.
    #[error("Rate limit exceeded for {request} after {attempts} attempts")]
    RateLimitExceeded { request: String, attempts: u32 },

    /// The queue gave up on a request after repeated network/server flakes.
    #[error("Transient failure for {request} after {attempts} attempts: {message}")]
    Transient {
        request: String,
        attempts: u32,
        message: String,
    },

    #[error("Request queue is closed")]
    QueueClosed,
}

#[derive(Error, Debug, Clone)]
pub enum PlatformApiError {
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Rate limit exceeded. Retry after {retry_after:?} seconds")]
    RateLimitExceeded { retry_after: Option<u64> },

    #[error("Forbidden access to resource: {resource}")]
    Forbidden { resource: String },

    #[error("Account not found: {actor}")]
    ActorNotFound { actor: String },

    #[error("Post not found: {uri}")]
    PostNotFound { uri: String },

    #[error("Invalid or expired session token")]
    InvalidToken,

    #[error("API endpoint unavailable: {endpoint}")]
    EndpointUnavailable { endpoint: String },

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Invalid API response: {details}")]
    InvalidResponse { details: String },

    #[error("Bad request: {details}")]
    BadRequest { details: String },

    #[error("Server error: {status_code}")]
    ServerError { status_code: u16 },
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Migration failed: {migration}")]
    MigrationFailed { migration: String },

    #[error("Query execution failed: {query}")]
    QueryFailed { query: String },

    #[error("Database locked")]
    DatabaseLocked,

    #[error("Unknown mention: {mention_id}")]
    UnknownMention { mention_id: String },

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Not enough data to analyze: {scorable_posts} scorable posts")]
    InsufficientData { scorable_posts: usize },

    #[error("Invalid activity window: {days} days")]
    InvalidWindow { days: u32 },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Environment variable not set: {var_name}")]
    MissingEnvironmentVariable { var_name: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}
