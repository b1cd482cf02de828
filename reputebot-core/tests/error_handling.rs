use reputebot_core::{
    AnalysisError, ConfigError, CoreError, DatabaseError, ErrorExt, ErrorRecovery, ErrorReporter,
    PlatformApiError, RecoveryStrategy,
};
use std::time::Duration;

#[test]
fn test_error_codes() {
    let platform_error = CoreError::Platform(PlatformApiError::InvalidToken);
    assert_eq!(platform_error.error_code(), "PLATFORM_API");

    let db_error = CoreError::Database(DatabaseError::DatabaseLocked);
    assert_eq!(db_error.error_code(), "DATABASE");

    let analysis_error = CoreError::Analysis(AnalysisError::InsufficientData { scorable_posts: 0 });
    assert_eq!(analysis_error.error_code(), "ANALYSIS");

    let config_error = CoreError::Config(ConfigError::MissingField {
        field: "handle".to_string(),
    });
    assert_eq!(config_error.error_code(), "CONFIG");

    let queue_error = CoreError::RateLimitExceeded {
        request: "post_reply".to_string(),
        attempts: 3,
    };
    assert_eq!(queue_error.error_code(), "RATE_LIMITED");
}

#[test]
fn test_retryable_errors() {
    let retryable_error = CoreError::Platform(PlatformApiError::RateLimitExceeded {
        retry_after: Some(60),
    });
    assert!(retryable_error.is_retryable());

    let server_error = CoreError::Platform(PlatformApiError::ServerError { status_code: 502 });
    assert!(server_error.is_retryable());

    let non_retryable_error = CoreError::Platform(PlatformApiError::BadRequest {
        details: "invalid record".to_string(),
    });
    assert!(!non_retryable_error.is_retryable());

    let insufficient = CoreError::Analysis(AnalysisError::InsufficientData { scorable_posts: 0 });
    assert!(!insufficient.is_retryable());
    assert!(insufficient.is_insufficient_data());
}

#[test]
fn test_retry_after() {
    let rate_limit_error = CoreError::Platform(PlatformApiError::RateLimitExceeded {
        retry_after: Some(60),
    });
    assert_eq!(
        rate_limit_error.retry_after(),
        Some(Duration::from_secs(60))
    );

    let timeout_error = CoreError::Timeout { seconds: 30 };
    assert_eq!(timeout_error.retry_after(), Some(Duration::from_secs(30)));
}

#[test]
fn test_auth_detection() {
    assert!(CoreError::Platform(PlatformApiError::InvalidToken).is_auth_failure());
    assert!(CoreError::Platform(PlatformApiError::AuthenticationFailed {
        reason: "expired".to_string()
    })
    .is_auth_failure());
    assert!(!CoreError::QueueClosed.is_auth_failure());
}

#[test]
fn test_user_friendly_messages() {
    let platform_error = CoreError::Platform(PlatformApiError::InvalidToken);
    let message = platform_error.user_friendly_message();
    assert!(message.contains("session token is invalid"));

    let config_error = CoreError::Config(ConfigError::MissingEnvironmentVariable {
        var_name: "BLUESKY_APP_PASSWORD".to_string(),
    });
    let message = config_error.user_friendly_message();
    assert!(message.contains("BLUESKY_APP_PASSWORD"));
}

#[test]
fn test_strategies_follow_taxonomy() {
    let cases = vec![
        (
            CoreError::Analysis(AnalysisError::InsufficientData { scorable_posts: 0 }),
            RecoveryStrategy::Fallback,
        ),
        (
            CoreError::Transient {
                request: "get_author_feed".to_string(),
                attempts: 3,
                message: "timeout".to_string(),
            },
            RecoveryStrategy::Requeue,
        ),
        (
            CoreError::Platform(PlatformApiError::InvalidToken),
            RecoveryStrategy::Halt,
        ),
        (
            CoreError::Platform(PlatformApiError::Forbidden {
                resource: "app.bsky.feed.getAuthorFeed".to_string(),
            }),
            RecoveryStrategy::Abandon,
        ),
    ];

    for (error, expected) in cases {
        assert_eq!(ErrorRecovery::determine_strategy(&error), expected, "{error}");
    }
}

#[test]
fn test_error_reporter() {
    let reporter = ErrorReporter::new()
        .with_error_reporting(true)
        .with_warning_reporting(true);
    let error = CoreError::Platform(PlatformApiError::InvalidToken);

    // This test just ensures the methods don't panic
    reporter.report_error(&error);
    reporter.report_warning(&error);
}
