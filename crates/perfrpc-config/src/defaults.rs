use crate::listen::ListenAddress;
use crate::logging::LogFormat;

/// Host the listener binds to when no address is configured.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default TCP port for the request/response listener.
pub const DEFAULT_TCP_PORT: u16 = 8899;

/// Default log filter expression used by the daemon.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Periodic notifications are disarmed by default.
pub const DEFAULT_NOTIFICATION_INTERVAL_SECS: u8 = 0;

/// Default log filter expression used by the daemon.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the daemon.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default listen address for the daemon.
#[must_use]
pub fn default_listen_address() -> ListenAddress {
    ListenAddress::new(DEFAULT_HOST, DEFAULT_TCP_PORT)
}

/// Default startup notification interval in seconds.
#[must_use]
pub const fn default_notification_interval_secs() -> u8 {
    DEFAULT_NOTIFICATION_INTERVAL_SECS
}
