use crate::utils::env::EnvVarError;
use std::fmt;
use thiserror::Error;

/// Well-known AMQP and Event Hubs condition symbols reported by the transport.
pub mod conditions {
    pub const SERVER_BUSY: &str = "com.microsoft:server-busy";
    pub const TIMEOUT: &str = "com.microsoft:timeout";
    pub const OPERATION_CANCELLED: &str = "com.microsoft:operation-cancelled";
    pub const CONTAINER_CLOSE: &str = "com.microsoft:container-close";
    pub const ENTITY_DISABLED: &str = "com.microsoft:entity-disabled";
    pub const ARGUMENT_ERROR: &str = "com.microsoft:argument-error";
    pub const ARGUMENT_OUT_OF_RANGE: &str = "com.microsoft:argument-out-of-range";

    pub const CONNECTION_FORCED: &str = "amqp:connection:forced";
    pub const CONNECTION_FRAMING_ERROR: &str = "amqp:connection:framing-error";
    pub const LINK_DETACH_FORCED: &str = "amqp:link:detach-forced";
    pub const LINK_STOLEN: &str = "amqp:link:stolen";
    pub const LINK_REDIRECT: &str = "amqp:link:redirect";
    pub const MESSAGE_SIZE_EXCEEDED: &str = "amqp:link:message-size-exceeded";
    pub const DECODE_ERROR: &str = "amqp:decode-error";
    pub const NOT_FOUND: &str = "amqp:not-found";
    pub const NOT_IMPLEMENTED: &str = "amqp:not-implemented";
    pub const NOT_ALLOWED: &str = "amqp:not-allowed";
    pub const UNAUTHORIZED_ACCESS: &str = "amqp:unauthorized-access";
    pub const FRAME_SIZE_TOO_SMALL: &str = "amqp:frame-size-too-small";
    pub const RESOURCE_DELETED: &str = "amqp:resource-deleted";
    pub const ILLEGAL_STATE: &str = "amqp:illegal-state";
    pub const PRECONDITION_FAILED: &str = "amqp:precondition-failed";

    /// Conditions that will not succeed when retried.
    pub const NO_RETRY: &[&str] = &[
        DECODE_ERROR,
        MESSAGE_SIZE_EXCEEDED,
        NOT_FOUND,
        NOT_IMPLEMENTED,
        LINK_REDIRECT,
        NOT_ALLOWED,
        UNAUTHORIZED_ACCESS,
        FRAME_SIZE_TOO_SMALL,
        RESOURCE_DELETED,
        ILLEGAL_STATE,
        PRECONDITION_FAILED,
        ARGUMENT_ERROR,
        ARGUMENT_OUT_OF_RANGE,
        ENTITY_DISABLED,
    ];

    /// Conditions that mean the connection or link itself is gone.
    pub const CONNECTION_LEVEL: &[&str] = &[
        CONNECTION_FORCED,
        CONNECTION_FRAMING_ERROR,
        LINK_DETACH_FORCED,
        LINK_STOLEN,
        CONTAINER_CLOSE,
    ];
}

/// Failure detail reported by the transport alongside an error outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCondition {
    /// Condition symbol, e.g. `com.microsoft:server-busy`
    pub name: String,
    /// Optional human-readable description from the service
    pub description: Option<String>,
}

impl ErrorCondition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
        }
    }

    /// Whether the condition names a connection or link level failure.
    pub fn is_connection_level(&self) -> bool {
        conditions::CONNECTION_LEVEL.contains(&self.name.as_str())
    }

    /// Whether retrying the operation could succeed.
    pub fn is_retryable(&self) -> bool {
        !conditions::NO_RETRY.contains(&self.name.as_str())
    }
}

impl fmt::Display for ErrorCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(description) => write!(f, "{} ({description})", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Errors surfaced by the producer send pipeline.
///
/// Retry decisions are not encoded here; they belong to the
/// [`ErrorClassifier`](crate::retry::ErrorClassifier) capability.
///
/// # Error Categories
///
/// - [`Validation`](EventHubError::Validation) - rejected input, never reaches the transport
/// - [`Connection`](EventHubError::Connection) - link open, authentication or link-level loss
/// - [`Timeout`](EventHubError::Timeout) - deadline exhausted or a timeout outcome
/// - [`Send`](EventHubError::Send) - the service rejected the delivery
/// - [`Closed`](EventHubError::Closed) - the producer was closed
/// - [`Configuration`](EventHubError::Configuration) - invalid settings
///
/// # Examples
///
/// ```no_run
/// use producer::common::EventHubError;
///
/// fn describe(error: &EventHubError) {
///     match error {
///         EventHubError::Timeout { last_error: Some(cause), .. } => {
///             eprintln!("timed out, last failure was: {cause}");
///         }
///         EventHubError::Send { condition } => {
///             eprintln!("service rejected the batch: {condition}");
///         }
///         other => eprintln!("send failed: {other}"),
///     }
/// }
/// ```
#[derive(Debug, Clone, Error)]
pub enum EventHubError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Connection error: {message}")]
    Connection {
        message: String,
        condition: Option<ErrorCondition>,
    },

    #[error("Operation timed out: {message}")]
    Timeout {
        message: String,
        #[source]
        last_error: Option<Box<EventHubError>>,
    },

    #[error("Send failed: {condition}")]
    Send { condition: ErrorCondition },

    #[error(
        "This producer has been closed. Please create a new producer to send event data."
    )]
    Closed,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl EventHubError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            condition: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
            last_error: None,
        }
    }

    /// Builds the error raised once a deadline has been reached.
    ///
    /// A timeout is propagated unchanged; any other last error is kept as the source.
    pub fn timeout_after(last_error: Option<EventHubError>) -> Self {
        match last_error {
            Some(error @ EventHubError::Timeout { .. }) => error,
            Some(error) => Self::Timeout {
                message: format!("deadline reached, last error: {error}"),
                last_error: Some(Box::new(error)),
            },
            None => Self::timeout("Send operation timed out"),
        }
    }

    /// Maps the condition of an error outcome onto the error taxonomy.
    pub fn from_condition(condition: ErrorCondition) -> Self {
        if condition.is_connection_level() {
            Self::Connection {
                message: format!("link lost: {condition}"),
                condition: Some(condition),
            }
        } else if condition.name == conditions::TIMEOUT {
            Self::Timeout {
                message: condition.to_string(),
                last_error: None,
            }
        } else {
            Self::Send { condition }
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, EventHubError::Timeout { .. })
    }

    /// Whether the error invalidates the current transport link.
    pub fn is_connection_level(&self) -> bool {
        matches!(self, EventHubError::Connection { .. })
    }

    /// The transport condition carried by the error, if any.
    pub fn condition(&self) -> Option<&ErrorCondition> {
        match self {
            EventHubError::Connection { condition, .. } => condition.as_ref(),
            EventHubError::Send { condition } => Some(condition),
            _ => None,
        }
    }
}

impl From<tokio::time::error::Elapsed> for EventHubError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        EventHubError::timeout(err.to_string())
    }
}

impl From<EnvVarError> for EventHubError {
    fn from(err: EnvVarError) -> Self {
        EventHubError::Configuration(err.to_string())
    }
}

// Result type alias for convenience
pub type EventHubResult<T> = Result<T, EventHubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_after_wraps_last_error() {
        let last = EventHubError::connection("socket reset");
        let error = EventHubError::timeout_after(Some(last));

        match error {
            EventHubError::Timeout {
                last_error: Some(cause),
                ..
            } => assert!(cause.is_connection_level()),
            other => panic!("Expected wrapped timeout, got {other:?}"),
        }
    }

    #[test]
    fn test_timeout_after_keeps_timeout_unchanged() {
        let last = EventHubError::timeout("link wait elapsed");
        let error = EventHubError::timeout_after(Some(last));
        assert_eq!(error.to_string(), "Operation timed out: link wait elapsed");
    }

    #[test]
    fn test_timeout_after_without_last_error() {
        let error = EventHubError::timeout_after(None);
        assert_eq!(error.to_string(), "Operation timed out: Send operation timed out");
    }

    #[test]
    fn test_from_condition_classifies_link_loss() {
        let error = EventHubError::from_condition(ErrorCondition::new(conditions::LINK_DETACH_FORCED));
        assert!(error.is_connection_level());
        assert_eq!(
            error.condition().map(|c| c.name.as_str()),
            Some(conditions::LINK_DETACH_FORCED)
        );

        let error = EventHubError::from_condition(ErrorCondition::with_description(
            conditions::SERVER_BUSY,
            "too many requests",
        ));
        assert!(matches!(error, EventHubError::Send { .. }));
        assert_eq!(
            error.to_string(),
            "Send failed: com.microsoft:server-busy (too many requests)"
        );

        let error = EventHubError::from_condition(ErrorCondition::new(conditions::TIMEOUT));
        assert!(error.is_timeout());
    }

    #[test]
    fn test_condition_retryability() {
        assert!(ErrorCondition::new(conditions::SERVER_BUSY).is_retryable());
        assert!(!ErrorCondition::new(conditions::UNAUTHORIZED_ACCESS).is_retryable());
        assert!(!ErrorCondition::new(conditions::MESSAGE_SIZE_EXCEEDED).is_retryable());
    }
}
