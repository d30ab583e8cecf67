//! Typed errors for the portal extraction library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so that every failure
//! can be classified into the pipeline's error taxonomy.

use thiserror::Error;

/// Substrings that identify a dead automation session.
///
/// Matched case-insensitively against raw driver messages.
pub const SESSION_DEAD_SIGNATURES: &[&str] = &[
    "connection refused",
    "read timed out",
    "read timeout",
    "invalid session id",
    "invalid session",
    "no such window",
    "session deleted",
    "chrome not reachable",
    "target window already closed",
    "disconnected",
];

/// How an error should be handled by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorSeverity {
    /// Retried by the retry executor, never surfaced past a pass boundary.
    Transient,
    /// Escalated to the session monitor, triggers recovery.
    SessionFatal,
    /// Malformed or unexpected structure; the pass result becomes empty.
    DataFatal,
    /// Bad credentials or missing second factor; aborts the journal.
    AuthFatal,
}

/// Errors reported by the automation driver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    /// An operation did not complete in time
    #[error("timeout during {operation}")]
    Timeout { operation: String },

    /// A locator matched nothing
    #[error("element not found: {locator}")]
    ElementNotFound { locator: String },

    /// An element handle no longer refers to a live element
    #[error("stale element reference: {element}")]
    StaleElement { element: String },

    /// Any other driver failure that is worth retrying
    #[error("transient driver error: {0}")]
    Transient(String),

    /// The browser session is gone
    #[error("session dead: {0}")]
    SessionDead(String),

    /// A script failed inside the page
    #[error("script error: {0}")]
    Script(String),

    /// Unclassified driver failure
    #[error("driver error: {0}")]
    Other(String),
}

impl DriverError {
    /// Classify a raw driver message by signature.
    ///
    /// Session-dead signatures win over everything else, then timeouts and
    /// missing elements. Anything unrecognised is `Other`.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if is_session_dead_message(&lower) {
            DriverError::SessionDead(message)
        } else if lower.contains("stale element") {
            DriverError::StaleElement { element: message }
        } else if lower.contains("timeout") || lower.contains("timed out") {
            DriverError::Timeout { operation: message }
        } else if lower.contains("no such element") || lower.contains("not found") {
            DriverError::ElementNotFound { locator: message }
        } else {
            DriverError::Other(message)
        }
    }

    /// Whether this error means the session itself has died.
    pub fn is_session_dead(&self) -> bool {
        match self {
            DriverError::SessionDead(_) => true,
            DriverError::Other(msg) | DriverError::Transient(msg) | DriverError::Script(msg) => {
                is_session_dead_message(&msg.to_lowercase())
            }
            _ => false,
        }
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_recoverable(&self) -> bool {
        if self.is_session_dead() {
            return false;
        }
        matches!(
            self,
            DriverError::Timeout { .. }
                | DriverError::ElementNotFound { .. }
                | DriverError::StaleElement { .. }
                | DriverError::Transient(_)
        )
    }
}

fn is_session_dead_message(lower: &str) -> bool {
    SESSION_DEAD_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

/// Errors raised while authenticating against a portal.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// The portal rejected the credentials
    #[error("invalid credentials")]
    InvalidCredentials,

    /// No second-factor code arrived in time
    #[error("second-factor code not received on channel {channel}")]
    MissingSecondFactor { channel: String },

    /// Login flow finished but the portal does not look logged in
    #[error("login failed: {reason}")]
    LoginFailed { reason: String },

    /// Driver failure during the login flow
    #[error("driver error during login: {0}")]
    Driver(#[from] DriverError),
}

impl AuthError {
    /// Driver hiccups during login may be retried, rejections may not.
    pub fn is_recoverable(&self) -> bool {
        match self {
            AuthError::Driver(e) => e.is_recoverable(),
            AuthError::LoginFailed { .. } => true,
            AuthError::InvalidCredentials | AuthError::MissingSecondFactor { .. } => false,
        }
    }
}

/// Errors that can occur during extraction operations.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Automation driver failed
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// A recoverable error persisted through every retry
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<ExtractionError>,
    },

    /// Page structure did not match expectations
    #[error("malformed page ({context}): {reason}")]
    MalformedPage { context: String, reason: String },

    /// Session died and could not be recovered
    #[error("session lost: {reason}")]
    SessionLost { reason: String },

    /// Authentication failed
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// The per-entity wall-clock budget ran out
    #[error("entity budget exceeded after {elapsed_ms}ms")]
    BudgetExceeded { elapsed_ms: u64 },

    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Configuration error
    #[error("config error: {reason}")]
    Config { reason: String },

    /// Operation was cancelled
    #[error("operation cancelled")]
    Cancelled,
}

impl ExtractionError {
    /// Build a malformed-page error.
    pub fn malformed(context: impl Into<String>, reason: impl Into<String>) -> Self {
        ExtractionError::MalformedPage {
            context: context.into(),
            reason: reason.into(),
        }
    }

    /// Wrap any storage backend error.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        ExtractionError::Storage(Box::new(err))
    }

    /// Map this error onto the pipeline's error taxonomy.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ExtractionError::Driver(e) if e.is_session_dead() => ErrorSeverity::SessionFatal,
            ExtractionError::Driver(e) if e.is_recoverable() => ErrorSeverity::Transient,
            ExtractionError::Driver(_) => ErrorSeverity::DataFatal,
            ExtractionError::RetriesExhausted { last, .. } => match last.severity() {
                ErrorSeverity::SessionFatal => ErrorSeverity::SessionFatal,
                _ => ErrorSeverity::DataFatal,
            },
            ExtractionError::SessionLost { .. } => ErrorSeverity::SessionFatal,
            ExtractionError::Auth(AuthError::Driver(e)) if e.is_session_dead() => {
                ErrorSeverity::SessionFatal
            }
            ExtractionError::Auth(e) if e.is_recoverable() => ErrorSeverity::Transient,
            ExtractionError::Auth(_) => ErrorSeverity::AuthFatal,
            ExtractionError::MalformedPage { .. }
            | ExtractionError::BudgetExceeded { .. }
            | ExtractionError::Storage(_)
            | ExtractionError::JsonParse(_)
            | ExtractionError::Config { .. }
            | ExtractionError::Cancelled => ErrorSeverity::DataFatal,
        }
    }

    /// Whether the retry executor should try again.
    pub fn is_recoverable(&self) -> bool {
        self.severity() == ErrorSeverity::Transient
    }

    /// Whether this error reveals a dead session.
    pub fn is_session_fatal(&self) -> bool {
        self.severity() == ErrorSeverity::SessionFatal
    }
}

/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractionError>;

/// Result type alias for driver operations.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Result type alias for authentication.
pub type AuthResult<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_message_detects_session_death() {
        assert!(matches!(
            DriverError::from_message("Connection refused (os error 111)"),
            DriverError::SessionDead(_)
        ));
        assert!(matches!(
            DriverError::from_message("invalid session id"),
            DriverError::SessionDead(_)
        ));
        assert!(matches!(
            DriverError::from_message("Read timed out"),
            DriverError::SessionDead(_)
        ));
    }

    #[test]
    fn test_from_message_transient_kinds() {
        assert!(matches!(
            DriverError::from_message("Timeout waiting for element"),
            DriverError::Timeout { .. }
        ));
        assert!(matches!(
            DriverError::from_message("no such element: #ref-table"),
            DriverError::ElementNotFound { .. }
        ));
        assert!(matches!(
            DriverError::from_message("stale element reference"),
            DriverError::StaleElement { .. }
        ));
        assert!(matches!(
            DriverError::from_message("something odd"),
            DriverError::Other(_)
        ));
    }

    #[test]
    fn test_severity_taxonomy() {
        let transient = ExtractionError::Driver(DriverError::Timeout {
            operation: "find".into(),
        });
        assert_eq!(transient.severity(), ErrorSeverity::Transient);
        assert!(transient.is_recoverable());

        let dead = ExtractionError::Driver(DriverError::Other("no such window".into()));
        assert_eq!(dead.severity(), ErrorSeverity::SessionFatal);
        assert!(!dead.is_recoverable());

        let data = ExtractionError::malformed("documents", "link without href");
        assert_eq!(data.severity(), ErrorSeverity::DataFatal);

        let auth = ExtractionError::Auth(AuthError::InvalidCredentials);
        assert_eq!(auth.severity(), ErrorSeverity::AuthFatal);
    }

    #[test]
    fn test_exhausted_keeps_session_fatal() {
        let err = ExtractionError::RetriesExhausted {
            attempts: 3,
            last: Box::new(ExtractionError::Driver(DriverError::SessionDead("gone".into()))),
        };
        assert!(err.is_session_fatal());

        let err = ExtractionError::RetriesExhausted {
            attempts: 3,
            last: Box::new(ExtractionError::Driver(DriverError::Transient("flaky".into()))),
        };
        assert_eq!(err.severity(), ErrorSeverity::DataFatal);
    }
}
