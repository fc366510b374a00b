//! TCP listener for the request/response channel.
//!
//! The transport binds the configured endpoint and accepts connections in a
//! background thread, handing each stream to a [`ConnectionHandler`] on its
//! own thread.

mod errors;
mod listener;

use std::net::TcpStream;

pub use self::errors::ListenerError;
pub use self::listener::{ListenerHandle, SocketListener};

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

/// Handles accepted socket connections.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Handles a single connection. Implementations should avoid panicking.
    fn handle(&self, stream: TcpStream);
}
