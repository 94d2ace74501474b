//! Error types for rlsdk.
//!
//! All errors are strongly typed using thiserror so callers can match on the
//! failure class (connection, configuration, state, transport) and decide
//! whether to re-drive a reconciliation.

use std::path::PathBuf;

use thiserror::Error;

/// Configuration errors raised while loading, resolving or validating
/// declarative documents.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A document or artifact path does not exist.
    #[error("Document not found: {}", .path.display())]
    NotFound {
        /// Offending path.
        path: PathBuf,
    },

    /// Reading a path failed.
    #[error("Failed to read {}: {message}", .path.display())]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying error message.
        message: String,
    },

    /// A document is not valid JSON or does not fit its type.
    #[error("Failed to parse {context}: {message}")]
    Parse {
        /// What was being parsed.
        context: String,
        /// Underlying error message.
        message: String,
    },

    /// A required field is absent or empty.
    #[error("Required field '{field}' is missing")]
    MissingField {
        /// Field name.
        field: String,
    },

    /// A field holds a value outside its allowed range.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidField {
        /// Field name.
        field: String,
        /// Why the value is rejected.
        reason: String,
    },

    /// A service type other than `agent` or `simenv`.
    #[error("Unknown service type '{value}' for '{id}' (expected agent or simenv)")]
    UnknownServiceType {
        /// Service id.
        id: String,
        /// Rejected value.
        value: String,
    },

    /// A model, hook or engine name the registry does not know.
    #[error("Unknown {kind} '{name}'")]
    UnknownName {
        /// `model`, `hook` or `engine`.
        kind: &'static str,
        /// Unknown name.
        name: String,
    },

    /// A document fails its JSON schema.
    #[error("Schema violation in {document}: {}", .violations.join("; "))]
    Schema {
        /// Document the violations were found in.
        document: String,
        /// One message per violation.
        violations: Vec<String>,
    },

    /// A reference entry is malformed or unreadable.
    #[error("Invalid reference '{key}': {reason}")]
    InvalidReference {
        /// Reference key.
        key: String,
        /// What is wrong with the entry.
        reason: String,
    },

    /// A declared service has no configuration of its kind.
    #[error("Service '{id}' is declared but has no {expected} configuration")]
    Unconfigured {
        /// Service id.
        id: String,
        /// Kind the configuration should have.
        expected: &'static str,
    },

    /// A configuration names an undeclared service.
    #[error("Configuration for '{id}' has no service descriptor")]
    Orphaned {
        /// Service id.
        id: String,
    },
}

impl ConfigError {
    /// Creates an invalid-field error.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            /// Field name.
            field: field.into(),
            /// Why the value is rejected.
            reason: reason.into(),
        }
    }

    /// Creates a parse error.
    pub fn parse(context: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Parse {
            /// What was being parsed.
            context: context.into(),
            /// Underlying error message.
            message: message.to_string(),
        }
    }
}

/// State errors: an operation conflicts with the local or remote task state.
#[derive(Debug, Error)]
pub enum StateError {
    /// No successful push or pull yet.
    #[error("Task not inited, call push() or pull() first")]
    NotInited,

    /// Push was called with no declared services.
    #[error("Task not configured: no services declared")]
    NotConfigured,

    /// A declared service is initialized remotely and reset was not requested.
    #[error("Service '{id}' already inited remotely (push with reset to overwrite)")]
    AlreadyInited {
        /// Service id.
        id: String,
    },

    /// Pull found no initialized service.
    #[error("No service is inited on the control plane")]
    NotInitedRemotely,

    /// Pull without reset over a non-empty local declaration.
    #[error("Task already holds local configuration (pull with reset to overwrite)")]
    LocalConfigPresent,

    /// The id is not declared with the kind the operation needs.
    #[error("Unknown service id '{id}'")]
    UnknownService {
        /// Service id.
        id: String,
    },
}

/// Transport errors for any mid-call control plane failure.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The control plane rejected or failed a call.
    #[error("Call {method} failed: {message}")]
    CallFailed {
        /// RPC name.
        method: &'static str,
        /// Underlying error message.
        message: String,
    },

    /// A payload could not be encoded.
    #[error("Failed to encode {what}: {message}")]
    EncodeFailed {
        /// Payload being converted.
        what: &'static str,
        /// Underlying error message.
        message: String,
    },

    /// A response could not be decoded.
    #[error("Failed to decode {what}: {message}")]
    DecodeFailed {
        /// Payload being converted.
        what: &'static str,
        /// Underlying error message.
        message: String,
    },

    /// A response left out a requested id.
    #[error("Response to {method} is missing id '{id}'")]
    MissingId {
        /// RPC name.
        method: &'static str,
        /// Service id.
        id: String,
    },
}

/// Top-level error type for rlsdk.
#[derive(Debug, Error)]
pub enum SdkError {
    /// The control plane could not be reached in time.
    #[error("Connection to {address} failed: {message}")]
    Connection {
        /// Control plane address.
        address: String,
        /// Underlying error message.
        message: String,
    },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Operation not allowed in the current state.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Failure during a call.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Bug or poisoned lock inside the SDK.
    #[error("Internal error: {message}")]
    Internal {
        /// Underlying error message.
        message: String,
    },
}

impl SdkError {
    /// Creates a connection error.
    #[must_use]
    pub fn connection(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            /// Control plane address.
            address: address.into(),
            /// Underlying error message.
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            /// Underlying error message.
            message: message.into(),
        }
    }

    /// Creates a failed-call transport error.
    #[must_use]
    pub fn call_failed(method: &'static str, message: impl Into<String>) -> Self {
        Self::Transport(TransportError::CallFailed {
            method,
            /// Underlying error message.
            message: message.into(),
        })
    }

    /// Returns true if this is a connection error.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Returns true if this is a state error.
    #[must_use]
    pub const fn is_state(&self) -> bool {
        matches!(self, Self::State(_))
    }

    /// Returns true if this is a transport error.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns true if re-issuing the same call may succeed.
    ///
    /// The SDK itself never retries; this only classifies the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Transport(e) => matches!(e, TransportError::CallFailed { .. }),
            Self::Configuration(_) | Self::State(_) | Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for rlsdk operations.
pub type SdkResult<T> = Result<T, SdkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_not_found() {
        let err = ConfigError::NotFound {
            path: PathBuf::from("/tmp/missing/configs.json"),
        };
        let msg = format!("{err}");
        assert!(msg.contains("not found"));
        assert!(msg.contains("configs.json"));
    }

    #[test]
    fn test_config_error_schema_joins_violations() {
        let err = ConfigError::Schema {
            document: "agent".to_string(),
            violations: vec!["a".to_string(), "b".to_string()],
        };
        assert!(err.to_string().contains("a; b"));
    }

    #[test]
    fn test_state_error_already_inited() {
        let err = StateError::AlreadyInited {
            id: "agent-main".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("agent-main"));
        assert!(msg.contains("reset"));
    }

    #[test]
    fn test_sdk_error_from_config() {
        let err: SdkError = ConfigError::invalid("port", "out of range").into();
        assert!(err.is_configuration());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_sdk_error_from_state() {
        let err: SdkError = StateError::NotInited.into();
        assert!(err.is_state());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_sdk_error_connection_retryable() {
        let err = SdkError::connection("localhost:10000", "timed out");
        assert!(err.is_connection());
        assert!(err.is_retryable());
        assert!(err.to_string().contains("localhost:10000"));
    }

    #[test]
    fn test_sdk_error_transport() {
        let err = SdkError::call_failed("SimControl", "unavailable");
        assert!(err.is_transport());
        assert!(err.is_retryable());

        let err: SdkError = TransportError::DecodeFailed {
            what: "weights",
            message: "eof".to_string(),
        }
        .into();
        assert!(err.is_transport());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_sdk_error_internal() {
        let err = SdkError::internal("poisoned lock");
        assert!(!err.is_retryable());
        assert!(format!("{err}").contains("poisoned lock"));
    }
}
