//! Error types for the PostgreSQL provider module.

use std::fmt::Display;

use thiserror::Error;

use crate::ids::IdParseError;

/// Errors that can occur while planning or applying a resource.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested resource was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An unexpected error reported by the management plane.
    #[error("SDK error: {0}")]
    Sdk(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An HTTP transport error occurred.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A stored or supplied resource ID could not be parsed.
    #[error("Invalid resource ID: {0}")]
    InvalidId(#[from] IdParseError),

    /// Resource already exists (create conflict).
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// Permission denied (authentication/authorization failure).
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Quota or rate limit exceeded.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Service temporarily unavailable.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Operation timed out or was cancelled.
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// Operation failed due to current state (precondition not met).
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// Invalid request from client.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Get the error message as a string.
    ///
    /// Returns a reference to the error message for any variant.
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(msg) => msg,
            Self::Validation(msg) => msg,
            Self::Sdk(msg) => msg,
            Self::Configuration(msg) => msg,
            Self::UnknownResource(msg) => msg,
            Self::Serialization(_err) => "serialization error (see Debug output)",
            Self::Transport(_err) => "transport error (see Debug output)",
            Self::InvalidId(_err) => "invalid resource ID (see Debug output)",
            Self::AlreadyExists(msg) => msg,
            Self::PermissionDenied(msg) => msg,
            Self::ResourceExhausted(msg) => msg,
            Self::Unavailable(msg) => msg,
            Self::DeadlineExceeded(msg) => msg,
            Self::FailedPrecondition(msg) => msg,
            Self::InvalidRequest(msg) => msg,
        }
    }

    /// Build the error returned when a create finds the resource already present.
    ///
    /// # Examples
    ///
    /// ```
    /// use azurerm_postgresql::ProviderError;
    ///
    /// let err = ProviderError::import_as_exists("azurerm_postgresql_database", "/subscriptions/x");
    /// assert!(err.message().contains("needs to be imported"));
    /// ```
    pub fn import_as_exists(resource_type: &str, id: &str) -> Self {
        Self::AlreadyExists(format!(
            "A resource with the ID {id:?} already exists - to be managed via Hemmer this \
             resource needs to be imported into the State. Please see the resource \
             documentation for {resource_type:?} for more information."
        ))
    }

    /// Map an HTTP status and ARM error body onto the error taxonomy.
    pub fn from_status(status: u16, code: &str, message: &str) -> Self {
        let msg = if code.is_empty() {
            format!("unexpected status {status}: {message}")
        } else {
            format!("unexpected status {status} with error: {code}: {message}")
        };
        match status {
            400 => Self::InvalidRequest(msg),
            401 | 403 => Self::PermissionDenied(msg),
            404 => Self::NotFound(msg),
            409 | 412 => Self::FailedPrecondition(msg),
            429 => Self::ResourceExhausted(msg),
            500..=599 => Self::Unavailable(msg),
            _ => Self::Sdk(msg),
        }
    }

    /// Whether this error represents a remote 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Prefix the message with context while keeping the variant.
    ///
    /// Variants wrapping a foreign error are folded into the nearest string
    /// variant so the context survives.
    #[must_use]
    pub fn context(self, context: impl Display) -> Self {
        match self {
            Self::NotFound(msg) => Self::NotFound(format!("{context}: {msg}")),
            Self::Validation(msg) => Self::Validation(format!("{context}: {msg}")),
            Self::Sdk(msg) => Self::Sdk(format!("{context}: {msg}")),
            Self::Configuration(msg) => Self::Configuration(format!("{context}: {msg}")),
            Self::UnknownResource(msg) => Self::UnknownResource(format!("{context}: {msg}")),
            Self::Serialization(err) => Self::Sdk(format!("{context}: decoding payload: {err}")),
            Self::Transport(err) => Self::Unavailable(format!("{context}: {err}")),
            Self::InvalidId(err) => Self::Validation(format!("{context}: {err}")),
            Self::AlreadyExists(msg) => Self::AlreadyExists(format!("{context}: {msg}")),
            Self::PermissionDenied(msg) => Self::PermissionDenied(format!("{context}: {msg}")),
            Self::ResourceExhausted(msg) => Self::ResourceExhausted(format!("{context}: {msg}")),
            Self::Unavailable(msg) => Self::Unavailable(format!("{context}: {msg}")),
            Self::DeadlineExceeded(msg) => Self::DeadlineExceeded(format!("{context}: {msg}")),
            Self::FailedPrecondition(msg) => {
                Self::FailedPrecondition(format!("{context}: {msg}"))
            },
            Self::InvalidRequest(msg) => Self::InvalidRequest(format!("{context}: {msg}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::NotFound("server1".to_string());
        assert_eq!(format!("{}", err), "Resource not found: server1");

        let err = ProviderError::Validation("invalid input".to_string());
        assert_eq!(format!("{}", err), "Validation error: invalid input");

        let err = ProviderError::UnknownResource("azurerm_mysql_server".to_string());
        assert_eq!(
            format!("{}", err),
            "Unknown resource type: azurerm_mysql_server"
        );
    }

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(
            ProviderError::from_status(400, "BadRequest", "nope"),
            ProviderError::InvalidRequest(_)
        ));
        assert!(matches!(
            ProviderError::from_status(403, "AuthorizationFailed", "nope"),
            ProviderError::PermissionDenied(_)
        ));
        assert!(ProviderError::from_status(404, "ResourceNotFound", "gone").is_not_found());
        assert!(matches!(
            ProviderError::from_status(409, "Conflict", "busy"),
            ProviderError::FailedPrecondition(_)
        ));
        assert!(matches!(
            ProviderError::from_status(429, "TooManyRequests", "slow down"),
            ProviderError::ResourceExhausted(_)
        ));
        assert!(matches!(
            ProviderError::from_status(503, "ServiceUnavailable", "later"),
            ProviderError::Unavailable(_)
        ));
        assert!(matches!(
            ProviderError::from_status(418, "", "teapot"),
            ProviderError::Sdk(_)
        ));
    }

    #[test]
    fn test_from_status_message() {
        let err = ProviderError::from_status(400, "InvalidParameterValue", "bad sku");
        assert_eq!(
            err.message(),
            "unexpected status 400 with error: InvalidParameterValue: bad sku"
        );
    }

    #[test]
    fn test_context_keeps_variant() {
        let err = ProviderError::DeadlineExceeded("last state: Inaccessible".to_string())
            .context("waiting for server1");
        assert!(matches!(err, ProviderError::DeadlineExceeded(_)));
        assert_eq!(
            err.message(),
            "waiting for server1: last state: Inaccessible"
        );
    }

    #[test]
    fn test_import_as_exists() {
        let err = ProviderError::import_as_exists("azurerm_postgresql_server", "/subscriptions/1");
        assert!(matches!(err, ProviderError::AlreadyExists(_)));
        assert!(err.message().contains("azurerm_postgresql_server"));
        assert!(err.message().contains("/subscriptions/1"));
    }

    #[test]
    fn test_message_method() {
        let err = ProviderError::Configuration("invalid config".to_string());
        assert_eq!(err.message(), "invalid config");

        let err = ProviderError::InvalidRequest("bad request".to_string());
        assert_eq!(err.message(), "bad request");
    }
}
