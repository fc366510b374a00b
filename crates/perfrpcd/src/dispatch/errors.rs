//! Error types and status codes for request dispatch.
//!
//! Every failure a caller can observe is reduced to one of the fixed
//! [`StatusCode`] kinds. Field-level problems inside loose objects never reach
//! this module; they are logged by the extractor and the field is skipped.

use std::fmt;
use std::io;

use serde::Serialize;
use thiserror::Error;

use crate::broker::CapabilityRefused;

/// Outcome kinds reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    /// The operation completed.
    Success,
    /// No operation is registered under the requested name.
    UnknownOperation,
    /// The request or its parameters could not be decoded.
    MalformedParameters,
    /// The capability broker refused the request.
    RefusedCapability,
    /// The daemon failed while serving the request.
    Internal,
}

impl StatusCode {
    /// Numeric code carried on the wire.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::UnknownOperation => 1,
            Self::MalformedParameters => 2,
            Self::RefusedCapability => 3,
            Self::Internal => 4,
        }
    }

    /// Canonical snake-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::UnknownOperation => "unknown_operation",
            Self::MalformedParameters => "malformed_parameters",
            Self::RefusedCapability => "refused_capability",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Errors surfaced during request parsing and dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Request line could not be parsed as JSON.
    #[error("malformed request: {message}")]
    MalformedRequest {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Request JSON does not carry a usable method name.
    #[error("invalid request structure: {message}")]
    InvalidStructure { message: String },

    /// No operation is registered under this name.
    #[error("unknown operation: {operation}")]
    UnknownOperation { operation: String },

    /// Parameters do not fit the operation's schema.
    #[error("malformed parameters for '{operation}': {message}")]
    MalformedParameters { operation: String, message: String },

    /// The broker refused an interface request.
    #[error(transparent)]
    RefusedCapability(#[from] CapabilityRefused),

    /// Request exceeds the maximum allowed size.
    #[error("request too large: {size} bytes exceeds {max_size} byte limit")]
    RequestTooLarge { size: usize, max_size: usize },

    /// IO error during read or write.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Response serialization failed.
    #[error("failed to serialize response: {0}")]
    SerializeResponse(#[from] serde_json::Error),

    /// Internal error (e.g., lock poisoned).
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl DispatchError {
    /// Maps the error onto the fixed status code set.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnknownOperation { .. } => StatusCode::UnknownOperation,
            Self::MalformedRequest { .. }
            | Self::InvalidStructure { .. }
            | Self::MalformedParameters { .. }
            | Self::RequestTooLarge { .. } => StatusCode::MalformedParameters,
            Self::RefusedCapability(_) => StatusCode::RefusedCapability,
            Self::Io(_) | Self::SerializeResponse(_) | Self::Internal { .. } => {
                StatusCode::Internal
            }
        }
    }

    /// Creates a malformed request error from a serde error.
    pub fn from_json_error(source: serde_json::Error) -> Self {
        Self::MalformedRequest {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates a malformed request error with a custom message.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRequest {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Creates an unknown operation error.
    pub fn unknown_operation(operation: impl Into<String>) -> Self {
        Self::UnknownOperation {
            operation: operation.into(),
        }
    }

    /// Creates a malformed parameters error.
    pub fn malformed_parameters(operation: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::MalformedParameters {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Creates a request too large error.
    pub fn request_too_large(size: usize, max_size: usize) -> Self {
        Self::RequestTooLarge { size, max_size }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::broker::InterfaceId;

    #[rstest]
    #[case::unknown(DispatchError::unknown_operation("nope"), StatusCode::UnknownOperation)]
    #[case::params(
        DispatchError::malformed_parameters("swap", "expected object"),
        StatusCode::MalformedParameters
    )]
    #[case::line(DispatchError::malformed("empty request line"), StatusCode::MalformedParameters)]
    #[case::too_large(DispatchError::request_too_large(10, 5), StatusCode::MalformedParameters)]
    #[case::refused(
        DispatchError::from(CapabilityRefused { interface: InterfaceId(9), version: 1 }),
        StatusCode::RefusedCapability
    )]
    #[case::internal(DispatchError::internal("poisoned"), StatusCode::Internal)]
    fn errors_map_to_status_codes(#[case] error: DispatchError, #[case] expected: StatusCode) {
        assert_eq!(error.status(), expected);
        assert_ne!(error.status().code(), StatusCode::Success.code());
    }

    #[test]
    fn status_codes_serialise_in_snake_case() {
        let encoded = serde_json::to_string(&StatusCode::UnknownOperation).expect("serialise");
        assert_eq!(encoded, r#""unknown_operation""#);
        assert_eq!(StatusCode::UnknownOperation.to_string(), "unknown_operation");
    }
}
