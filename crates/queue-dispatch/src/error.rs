//! Error types for queue dispatch operations.
//!
//! Errors are split by how the dispatch layer treats them:
//!
//! - [`ConfigurationError`] always reaches the caller. These indicate a
//!   deployment mistake, never a transient condition.
//! - [`TransportError`] is handled per operation: governed by the failure
//!   policy on publish, propagated on receive, swallowed on acknowledgment,
//!   health checks and counts.
//! - [`ValidationError`] covers caller-supplied values that cannot be parsed.

use thiserror::Error;

/// Top-level error for every dispatch operation
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Message serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl DispatchError {
    /// Check if the error is a deployment/configuration mistake
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Check if error is transient and a later attempt might succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Errors caused by missing or inconsistent deployment configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Invalid offline mode '{value}', expected one of: {valid}")]
    InvalidOfflineMode { value: String, valid: String },

    #[error("Queue '{queue_name}' is not registered; add it to the `queues` configuration")]
    QueueNotRegistered { queue_name: String },

    #[error(
        "Queue '{queue_name}' has no registered consumer function; add it to the `consumers` \
         configuration to publish in direct offline mode"
    )]
    ConsumerNotRegistered { queue_name: String },

    #[error("Queue '{queue_name}' has no transport endpoint in offline mode '{mode}'")]
    QueueNotAddressable { queue_name: String, mode: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration loading failed: {message}")]
    Loading { message: String },
}

/// Errors reported by the queue or invocation transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Request timed out: {message}")]
    Timeout { message: String },

    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Queue does not exist: {message}")]
    QueueNotFound { message: String },

    #[error("Service error ({status}) {code}: {message}")]
    Service {
        code: String,
        message: String,
        status: u16,
    },

    #[error("Invalid response from transport: {message}")]
    InvalidResponse { message: String },

    #[error("Invocation of function '{function}' failed ({status}): {message}")]
    InvocationFailed {
        function: String,
        status: u16,
        message: String,
    },

    #[error("Invalid request to '{endpoint}': {message}")]
    InvalidRequest { endpoint: String, message: String },

    #[error("Failed to build transport client: {message}")]
    ClientConstruction { message: String },
}

impl TransportError {
    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Timeout { .. } => true,
            Self::Authentication { .. } => false,
            Self::QueueNotFound { .. } => false,
            Self::Service { code, status, .. } => {
                *status >= 500 || *status == 429 || is_throttling_code(code)
            }
            Self::InvalidResponse { .. } => false,
            Self::InvocationFailed { status, .. } => *status >= 500 || *status == 429,
            Self::InvalidRequest { .. } => false,
            Self::ClientConstruction { .. } => false,
        }
    }
}

fn is_throttling_code(code: &str) -> bool {
    matches!(
        code,
        "Throttling" | "ThrottlingException" | "RequestThrottled" | "ServiceUnavailable"
    )
}

/// Errors for caller-supplied values that cannot be interpreted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid failure policy '{value}', expected one of: {valid}")]
    InvalidFailurePolicy { value: String, valid: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
