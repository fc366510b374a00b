//! Installs the process-wide `tracing` subscriber.
//!
//! Telemetry is installed once per process. The first configuration wins and
//! later calls only report which format is active.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing::info;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::{EnvFilter, fmt};

use perfrpc_config::{Config, LogFormat};

const TELEMETRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::telemetry");

static INSTALLED: OnceCell<LogFormat> = OnceCell::new();

/// Proof that telemetry is installed, naming the active output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryHandle {
    format: LogFormat,
}

impl TelemetryHandle {
    /// Format chosen by the first successful installation.
    #[must_use]
    pub const fn format(self) -> LogFormat {
        self.format
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The configured filter expression did not parse.
    #[error("invalid log filter '{filter}': {message}")]
    Filter {
        /// Rejected expression.
        filter: String,
        /// Parser diagnostic.
        message: String,
    },
    /// Another global subscriber was installed first.
    #[error("a global tracing subscriber is already installed: {0}")]
    Subscriber(#[source] SetGlobalDefaultError),
}

/// Installs the subscriber described by `config` on first use.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for an unparsable filter and
/// [`TelemetryError::Subscriber`] when a foreign subscriber is present.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    let format = *INSTALLED.get_or_try_init(|| install(config))?;
    Ok(TelemetryHandle { format })
}

fn install(config: &Config) -> Result<LogFormat, TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter()).map_err(|error| TelemetryError::Filter {
        filter: config.log_filter().to_owned(),
        message: error.to_string(),
    })?;
    let format = config.log_format();
    let colour = !format.is_structured() && io::stderr().is_terminal();

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .with_writer(io::stderr)
        .with_ansi(colour)
        .with_timer(fmt::time::UtcTime::rfc_3339());
    let installed = match format {
        LogFormat::Json => tracing::subscriber::set_global_default(
            builder.json().flatten_event(true).finish(),
        ),
        LogFormat::Compact => tracing::subscriber::set_global_default(builder.compact().finish()),
    };
    installed.map_err(TelemetryError::Subscriber)?;

    info!(
        target: TELEMETRY_TARGET,
        %format,
        filter = config.log_filter(),
        listen = %config.listen(),
        notification_interval_secs = config.notification_interval_secs,
        "telemetry installed"
    );
    Ok(format)
}
