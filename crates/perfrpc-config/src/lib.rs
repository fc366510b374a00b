//! Layered configuration for the perfrpc daemon.
//!
//! Values are merged from built-in defaults, an optional configuration file,
//! `PERFRPC_*` environment variables and command-line flags by
//! [`ortho_config`]. Every field carries a serde default so that a layer which
//! omits a value never causes the load to fail.

mod defaults;
mod listen;
mod logging;

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_HOST, DEFAULT_LOG_FILTER, DEFAULT_NOTIFICATION_INTERVAL_SECS, DEFAULT_TCP_PORT,
    default_listen_address, default_log_filter, default_log_filter_string, default_log_format,
    default_notification_interval_secs,
};
pub use listen::{ListenAddress, ListenAddressParseError};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "PERFRPC")]
pub struct Config {
    /// Address the request/response listener binds to.
    #[serde(default = "defaults::default_listen_address")]
    #[ortho_config(default = defaults::default_listen_address())]
    pub listen: ListenAddress,
    /// `tracing` filter expression applied to daemon telemetry.
    #[serde(default = "defaults::default_log_filter_string")]
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Output format for daemon telemetry.
    #[serde(default = "defaults::default_log_format")]
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
    /// Interval of the periodic time notification armed at startup, in
    /// seconds. Zero leaves notifications disarmed until a client starts them.
    #[serde(default = "defaults::default_notification_interval_secs")]
    #[ortho_config(default = defaults::default_notification_interval_secs())]
    pub notification_interval_secs: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen_address(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            notification_interval_secs: default_notification_interval_secs(),
        }
    }
}

impl Config {
    /// Address the listener binds to.
    #[must_use]
    pub const fn listen(&self) -> &ListenAddress {
        &self.listen
    }

    /// Filter expression used when installing the telemetry subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Telemetry output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Startup notification interval, or `None` when notifications start
    /// disarmed.
    #[must_use]
    pub fn notification_interval(&self) -> Option<Duration> {
        match self.notification_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(u64::from(secs))),
        }
    }
}
