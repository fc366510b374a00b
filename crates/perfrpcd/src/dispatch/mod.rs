//! JSONL request dispatch for named operations.
//!
//! Clients send one request object per line and receive one reply line per
//! request. Notifications for the connection may arrive between replies.
//!
//! ```json
//! {"id":1,"method":"set_geometry","params":{"x":5}}
//! ```
//!
//! ```json
//! {"kind":"result","id":1,"result":null}
//! {"kind":"error","id":2,"status":"unknown_operation","code":1,"message":"unknown operation: bogus"}
//! {"kind":"notification","event":"time","params":"Tue, 01 Sep 2026 10:00:00 +0000"}
//! ```
//!
//! Operations are registered in a [`MethodRegistry`] at startup; the
//! [`MethodDispatcher`] adds the subscription built-ins and answers `exists`.

mod dispatcher;
mod errors;
mod handler;
mod methods;
mod notify;
mod params;
pub mod performance;
mod registry;
mod request;
mod response;
mod timer;

pub use self::dispatcher::{BUILTIN_OPERATIONS, MethodDispatcher};
pub use self::errors::{DispatchError, StatusCode};
pub use self::handler::DispatchConnectionHandler;
pub use self::methods::{MESSAGE_EVENT, Service};
pub use self::notify::{NotificationSink, Notifier};
pub use self::params::{
    Availability, BufferResponse, ExchangeParams, ExtendedParams, ExtendedResponse,
    MessageParams, NotificationParams, ReceiveParams, SendParams, SendResponse,
    SubscriptionParams,
};
pub use self::registry::{CallContext, MethodRegistry};
pub use self::request::Request;
pub use self::response::{DaemonMessage, ResponseWriter, SharedWriter};
pub use self::timer::{NotificationTimer, TIME_EVENT};

#[cfg(test)]
pub(crate) use self::notify::RecordingSink;

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
