//! Request deserialization for the dispatch loop.
//!
//! Each JSONL line names an operation and optionally carries an id and
//! parameters. The id is echoed in the reply so callers can pair responses
//! with requests.

use serde::Deserialize;
use serde_json::Value;

use super::errors::DispatchError;

/// Parsed operation request from a client.
#[derive(Debug, Deserialize)]
pub struct Request {
    /// Correlation id echoed in the reply.
    #[serde(default)]
    pub id: Option<u64>,
    /// Name of the operation to invoke.
    pub method: String,
    /// Raw parameters handed to the operation.
    #[serde(default)]
    pub params: Option<Value>,
}

impl Request {
    /// Parses a JSONL line into a request.
    ///
    /// Trailing whitespace (including the newline delimiter) is trimmed before
    /// parsing.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::MalformedRequest` if the line is empty or does
    /// not match the request schema.
    pub fn parse(line: &[u8]) -> Result<Self, DispatchError> {
        let trimmed = trim_trailing_whitespace(line);
        if trimmed.is_empty() {
            return Err(DispatchError::malformed("empty request line"));
        }

        serde_json::from_slice(trimmed).map_err(DispatchError::from_json_error)
    }

    /// Validates that the method name is non-empty.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::InvalidStructure` if the method is empty or
    /// contains only whitespace.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.method.trim().is_empty() {
            return Err(DispatchError::invalid_structure("method field is empty"));
        }
        Ok(())
    }

    /// Returns the normalised method name (trimmed).
    pub fn method(&self) -> &str {
        self.method.trim()
    }
}

fn trim_trailing_whitespace(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |pos| pos + 1);
    &bytes[..end]
}
