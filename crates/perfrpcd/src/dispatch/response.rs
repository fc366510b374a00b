//! Response serialization helpers for the dispatch loop.
//!
//! Replies and notifications share one connection, so the writer used for a
//! connection is wrapped in a [`SharedWriter`] that serialises whole lines.

use std::fmt;
use std::io::Write;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value;

use super::errors::{DispatchError, StatusCode};
use super::notify::NotificationSink;

/// Messages sent to clients, one JSONL line each.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DaemonMessage {
    /// Successful reply to a request.
    Result {
        /// Correlation id of the request.
        id: Option<u64>,
        /// Operation result; `null` for operations without output.
        result: Value,
    },
    /// Failed reply to a request.
    Error {
        /// Correlation id of the request.
        id: Option<u64>,
        /// Failure kind.
        status: StatusCode,
        /// Numeric form of `status`.
        code: i32,
        /// Human readable detail.
        message: String,
    },
    /// Unsolicited event pushed to the connection.
    Notification {
        /// Event name.
        event: String,
        /// Event payload.
        params: Value,
    },
}

impl DaemonMessage {
    /// Creates a result message.
    pub fn result(id: Option<u64>, result: Value) -> Self {
        Self::Result { id, result }
    }

    /// Creates an error message from a dispatch error.
    pub fn error(id: Option<u64>, error: &DispatchError) -> Self {
        let status = error.status();
        Self::Error {
            id,
            status,
            code: status.code(),
            message: error.to_string(),
        }
    }

    /// Creates a notification message.
    pub fn notification(event: impl Into<String>, params: Value) -> Self {
        Self::Notification {
            event: event.into(),
            params,
        }
    }
}

/// Writer that serializes daemon messages to a stream.
pub struct ResponseWriter<W> {
    writer: W,
}

impl<W: Write> ResponseWriter<W> {
    /// Creates a new response writer wrapping the given output stream.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a daemon message as a JSONL line and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_message(&mut self, message: &DaemonMessage) -> Result<(), DispatchError> {
        serde_json::to_writer(&mut self.writer, message)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Writes a successful reply.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_result(&mut self, id: Option<u64>, result: Value) -> Result<(), DispatchError> {
        self.write_message(&DaemonMessage::result(id, result))
    }

    /// Writes a failed reply carrying the error's status.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_error(
        &mut self,
        id: Option<u64>,
        error: &DispatchError,
    ) -> Result<(), DispatchError> {
        self.write_message(&DaemonMessage::error(id, error))
    }
}

/// Response writer shared between the request loop and notification senders.
pub struct SharedWriter<W> {
    inner: Mutex<ResponseWriter<W>>,
}

impl<W: Write> SharedWriter<W> {
    /// Wraps `writer` for shared use.
    pub fn new(writer: W) -> Self {
        Self {
            inner: Mutex::new(ResponseWriter::new(writer)),
        }
    }

    /// Writes one message while holding the connection lock.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn send(&self, message: &DaemonMessage) -> Result<(), DispatchError> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write_message(message)
    }
}

impl<W: Write + Send> NotificationSink for SharedWriter<W> {
    fn deliver(&self, message: &DaemonMessage) -> Result<(), DispatchError> {
        self.send(message)
    }
}

impl<W> fmt::Debug for SharedWriter<W> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("SharedWriter").finish_non_exhaustive()
    }
}
