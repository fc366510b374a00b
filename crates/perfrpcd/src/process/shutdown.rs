use std::io;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::info;

use super::PROCESS_TARGET;

/// Signals that stop the daemon by default.
pub const TERMINATION_SIGNALS: [i32; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

/// Blocks the launcher until the daemon should stop.
pub trait ShutdownSignal: Send + Sync {
    /// Returns once shutdown should begin.
    ///
    /// # Errors
    ///
    /// Returns an error when the notification source cannot be watched.
    fn wait(&self) -> Result<(), ShutdownError>;
}

/// Failures while waiting for a stop request.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Registering the signal handlers failed.
    #[error("cannot watch signals {signals:?}: {source}")]
    Install {
        /// Signals that were requested.
        signals: Vec<i32>,
        /// Registration failure.
        #[source]
        source: io::Error,
    },
    /// The signal stream ended without delivering a signal.
    #[error("signal stream closed before a stop request arrived")]
    Closed,
}

/// Waits for one of a fixed set of process signals.
#[derive(Debug, Clone)]
pub struct SystemShutdownSignal {
    signals: Vec<i32>,
}

impl SystemShutdownSignal {
    /// Watches [`TERMINATION_SIGNALS`].
    #[must_use]
    pub fn new() -> Self {
        Self::only(TERMINATION_SIGNALS)
    }

    /// Watches exactly `signals`.
    #[must_use]
    pub fn only(signals: impl IntoIterator<Item = i32>) -> Self {
        Self {
            signals: signals.into_iter().collect(),
        }
    }

    /// Signals this listener reacts to.
    #[must_use]
    pub fn signals(&self) -> &[i32] {
        &self.signals
    }
}

impl Default for SystemShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let mut signals =
            Signals::new(&self.signals).map_err(|source| ShutdownError::Install {
                signals: self.signals.clone(),
                source,
            })?;
        let signal = signals.forever().next().ok_or(ShutdownError::Closed)?;
        info!(
            target: PROCESS_TARGET,
            signal,
            name = signal_name(signal),
            "stop requested"
        );
        Ok(())
    }
}

fn signal_name(signal: i32) -> &'static str {
    match signal {
        SIGTERM => "SIGTERM",
        SIGINT => "SIGINT",
        SIGQUIT => "SIGQUIT",
        SIGHUP => "SIGHUP",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn default_listener_watches_termination_signals() {
        assert_eq!(SystemShutdownSignal::default().signals(), TERMINATION_SIGNALS);
        assert_eq!(SystemShutdownSignal::only([SIGINT]).signals(), [SIGINT]);
    }

    #[rstest]
    #[case::term(SIGTERM, "SIGTERM")]
    #[case::hangup(SIGHUP, "SIGHUP")]
    #[case::unknown(0, "other")]
    fn names_logged_signals(#[case] signal: i32, #[case] name: &str) {
        assert_eq!(signal_name(signal), name);
    }
}
