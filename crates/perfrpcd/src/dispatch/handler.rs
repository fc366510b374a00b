//! Connection handler that dispatches JSONL requests.
//!
//! A connection carries any number of request lines. Each line is answered
//! with one reply line; notifications for the connection are interleaved on
//! the same stream as whole lines. The connection is registered with the
//! notifier for as long as it stays open.

use std::io::{BufRead, BufReader, Read};
use std::net::TcpStream;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::connection::{ConnectionId, ConnectionIds};
use crate::transport::ConnectionHandler;

use super::dispatcher::MethodDispatcher;
use super::errors::DispatchError;
use super::notify::NotificationSink;
use super::registry::CallContext;
use super::request::Request;
use super::response::{DaemonMessage, SharedWriter};
use super::DISPATCH_TARGET;

/// Maximum size of a single request line in bytes.
pub(crate) const MAX_REQUEST_BYTES: usize = 1024 * 1024;

/// Connection handler that parses and dispatches JSONL requests.
#[derive(Debug)]
pub struct DispatchConnectionHandler {
    dispatcher: Arc<MethodDispatcher>,
    ids: ConnectionIds,
}

impl DispatchConnectionHandler {
    /// Creates a handler routing requests to `dispatcher`.
    pub fn new(dispatcher: Arc<MethodDispatcher>) -> Self {
        Self {
            dispatcher,
            ids: ConnectionIds::new(),
        }
    }

    fn dispatch(&self, stream: TcpStream) {
        let connection = self.ids.next();
        let writer = match stream.try_clone() {
            Ok(writer) => Arc::new(SharedWriter::new(writer)),
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %connection, %error, "failed to split stream");
                return;
            }
        };
        let notifier = self.dispatcher.notifier();
        notifier.attach(
            connection,
            Arc::clone(&writer) as Arc<dyn NotificationSink>,
        );

        let mut reader = BufReader::new(stream);
        loop {
            let line = match read_request_line(&mut reader) {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!(target: DISPATCH_TARGET, %connection, "client disconnected");
                    break;
                }
                Err(error) => {
                    warn!(target: DISPATCH_TARGET, %connection, %error, "failed to read request");
                    if let Err(reply_error) = writer.send(&DaemonMessage::error(None, &error)) {
                        warn!(
                            target: DISPATCH_TARGET,
                            %connection,
                            error = %reply_error,
                            "failed to write error reply"
                        );
                    }
                    break;
                }
            };
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let reply = self.serve(connection, &line);
            if let Err(error) = writer.send(&reply) {
                warn!(target: DISPATCH_TARGET, %connection, %error, "failed to write reply");
                break;
            }
        }

        notifier.detach(connection);
    }

    fn serve(&self, connection: ConnectionId, line: &[u8]) -> DaemonMessage {
        let request = match Request::parse(line) {
            Ok(request) => request,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %connection, %error, "malformed request");
                return DaemonMessage::error(None, &error);
            }
        };
        if let Err(error) = request.validate() {
            warn!(target: DISPATCH_TARGET, %connection, %error, "invalid request");
            return DaemonMessage::error(request.id, &error);
        }

        let context = CallContext::new(connection);
        let id = request.id;
        let method = request.method().to_owned();
        match self.dispatcher.invoke(&method, &context, request.params) {
            Ok(result) => DaemonMessage::result(id, result),
            Err(error) => {
                debug!(
                    target: DISPATCH_TARGET,
                    %connection,
                    operation = %method,
                    status = %error.status(),
                    %error,
                    "operation failed"
                );
                DaemonMessage::error(id, &error)
            }
        }
    }
}

impl ConnectionHandler for DispatchConnectionHandler {
    fn handle(&self, stream: TcpStream) {
        self.dispatch(stream);
    }
}

/// Reads one bounded JSONL line.
///
/// Returns `Ok(None)` at end of stream. A final line without a newline is
/// still returned.
fn read_request_line<R: BufRead>(reader: &mut R) -> Result<Option<Vec<u8>>, DispatchError> {
    let mut buffer = Vec::new();
    let limit = u64::try_from(MAX_REQUEST_BYTES + 1).unwrap_or(u64::MAX);
    let read = reader.by_ref().take(limit).read_until(b'\n', &mut buffer)?;
    if read == 0 {
        return Ok(None);
    }
    enforce_limit(buffer.len())?;
    Ok(Some(buffer))
}

/// Enforces the maximum request size limit.
fn enforce_limit(size: usize) -> Result<(), DispatchError> {
    if size > MAX_REQUEST_BYTES {
        return Err(DispatchError::request_too_large(size, MAX_REQUEST_BYTES));
    }
    Ok(())
}
