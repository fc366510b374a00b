//! Failures of the request/response listener.

use std::io;

use thiserror::Error;

use perfrpc_config::ListenAddress;

/// Errors surfaced while binding or running the listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The endpoint host produced no socket address.
    #[error("cannot resolve listen endpoint {endpoint}")]
    Resolve {
        /// Configured endpoint.
        endpoint: ListenAddress,
        /// Resolver failure; `None` when resolution returned nothing.
        #[source]
        source: Option<io::Error>,
    },
    /// Every resolved address refused the bind.
    #[error("cannot bind listen endpoint {endpoint} after {attempts} address(es)")]
    Bind {
        /// Configured endpoint.
        endpoint: ListenAddress,
        /// Number of resolved addresses tried.
        attempts: usize,
        /// Error from the last attempt.
        #[source]
        source: io::Error,
    },
    /// The accept socket could not be switched to non-blocking mode.
    #[error("cannot poll listener socket: {0}")]
    NonBlocking(#[source] io::Error),
    /// The accept thread could not be spawned.
    #[error("cannot spawn listener thread: {0}")]
    Spawn(#[source] io::Error),
    /// The accept thread panicked.
    #[error("listener thread panicked")]
    ThreadPanic,
}
