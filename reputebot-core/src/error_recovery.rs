//! Recovery policy for errors raised while answering a mention.
//!
//! The pipeline never retries inline; the request queue already did that. What
//! is left is deciding what the mention's ledger entry should look like afterwards.

use crate::{AnalysisError, CoreError, ErrorExt, PlatformApiError};
use tracing::debug;

/// What to do with a mention after an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Release the claim so a later poll picks the mention up again.
    Requeue,
    /// Answer with the low-confidence "not enough data" report instead.
    Fallback,
    /// Record a permanent failure; never retry.
    Abandon,
    /// Stop the bot; nothing will succeed until an operator steps in.
    Halt,
}

pub struct ErrorRecovery;

impl ErrorRecovery {
    /// Determine the appropriate recovery strategy for a given error
    pub fn determine_strategy(error: &CoreError) -> RecoveryStrategy {
        let strategy = match error {
            CoreError::Platform(
                PlatformApiError::AuthenticationFailed { .. } | PlatformApiError::InvalidToken,
            ) => RecoveryStrategy::Halt,

            CoreError::Config(_) => RecoveryStrategy::Halt,

            // An unknown or vanished account still gets an answer.
            CoreError::Platform(PlatformApiError::ActorNotFound { .. })
            | CoreError::Analysis(AnalysisError::InsufficientData { .. }) => {
                RecoveryStrategy::Fallback
            }

            CoreError::RateLimitExceeded { .. }
            | CoreError::Transient { .. }
            | CoreError::QueueClosed => RecoveryStrategy::Requeue,

            // Storage trouble must never look like "already answered".
            CoreError::Database(_) => RecoveryStrategy::Requeue,

            other if other.is_retryable() => RecoveryStrategy::Requeue,

            _ => RecoveryStrategy::Abandon,
        };

        debug!(
            "Recovery strategy for {}: {:?}",
            error.error_code(),
            strategy
        );
        strategy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConfigError, DatabaseError};

    #[test]
    fn test_auth_failures_halt() {
        let error = CoreError::Platform(PlatformApiError::InvalidToken);
        assert_eq!(
            ErrorRecovery::determine_strategy(&error),
            RecoveryStrategy::Halt
        );

        let error = CoreError::Platform(PlatformApiError::AuthenticationFailed {
            reason: "bad password".to_string(),
        });
        assert_eq!(
            ErrorRecovery::determine_strategy(&error),
            RecoveryStrategy::Halt
        );
    }

    #[test]
    fn test_queue_exhaustion_requeues() {
        let error = CoreError::RateLimitExceeded {
            request: "get_author_feed".to_string(),
            attempts: 3,
        };
        assert_eq!(
            ErrorRecovery::determine_strategy(&error),
            RecoveryStrategy::Requeue
        );

        let error = CoreError::Transient {
            request: "get_profile".to_string(),
            attempts: 3,
            message: "502".to_string(),
        };
        assert_eq!(
            ErrorRecovery::determine_strategy(&error),
            RecoveryStrategy::Requeue
        );
    }

    #[test]
    fn test_insufficient_data_falls_back() {
        let error = CoreError::Analysis(AnalysisError::InsufficientData { scorable_posts: 0 });
        assert_eq!(
            ErrorRecovery::determine_strategy(&error),
            RecoveryStrategy::Fallback
        );

        let error = CoreError::Platform(PlatformApiError::ActorNotFound {
            actor: "ghost.bsky.social".to_string(),
        });
        assert_eq!(
            ErrorRecovery::determine_strategy(&error),
            RecoveryStrategy::Fallback
        );
    }

    #[test]
    fn test_permanent_errors_abandon() {
        let error = CoreError::Platform(PlatformApiError::BadRequest {
            details: "record too long".to_string(),
        });
        let strategy = ErrorRecovery::determine_strategy(&error);
        assert_eq!(strategy, RecoveryStrategy::Abandon);
    }

    #[test]
    fn test_storage_errors_requeue() {
        let error = CoreError::Database(DatabaseError::QueryFailed {
            query: "insert".to_string(),
        });
        assert_eq!(
            ErrorRecovery::determine_strategy(&error),
            RecoveryStrategy::Requeue
        );

        let error = CoreError::Internal {
            message: "unexpected response to get_profile".to_string(),
        };
        assert_eq!(
            ErrorRecovery::determine_strategy(&error),
            RecoveryStrategy::Abandon
        );

        let error = CoreError::Config(ConfigError::MissingField {
            field: "handle".to_string(),
        });
        assert_eq!(
            ErrorRecovery::determine_strategy(&error),
            RecoveryStrategy::Halt
        );
    }
}
