//! Method-dispatch daemon with a timed binary exchange channel.
//!
//! Remote callers invoke named operations over a JSONL request/response
//! channel (see [`dispatch`]). Operations read and write the shared window
//! geometry, schedule periodic or one-shot notifications, and push buffers
//! through a [`Performance`] channel whose measured duration is returned in
//! the reply. A separate process may obtain a shared handle to the same
//! channel through the [`InterfaceBroker`].
//!
//! Startup follows [`bootstrap_with`]: configuration is loaded through
//! [`perfrpc_config`], structured telemetry is installed, the component graph
//! is assembled and the scheduler runtime is started. Lifecycle events are
//! surfaced through a [`HealthReporter`].

mod bootstrap;
pub mod broker;
mod connection;
pub mod dispatch;
pub mod exchange;
pub mod geometry;
mod health;
pub mod loose;
mod process;
pub mod scheduler;
mod telemetry;
mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, RuntimeError, StaticConfigLoader, SystemConfigLoader,
    bootstrap_with,
};
pub use broker::{
    ANY_VERSION, BrokerState, CapabilityRefused, InterfaceBroker, InterfaceHandle, InterfaceId,
    SUPPORTED_VERSION,
};
pub use connection::ConnectionId;
pub use dispatch::{DispatchError, MethodDispatcher, MethodRegistry, StatusCode};
pub use exchange::{BinaryExchangeChannel, Performance};
pub use geometry::{GeometryStore, GeometryUpdate, Rectangle};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_daemon};
pub use scheduler::{Clock, JobId, ManualClock, Scheduler, SystemClock};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::{ConnectionHandler, ListenerError};

#[cfg(test)]
mod tests;
