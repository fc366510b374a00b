//! Errors surfaced while launching or supervising the daemon process.

use thiserror::Error;

use crate::bootstrap::{BootstrapError, RuntimeError};

use super::shutdown::ShutdownError;

/// Errors surfaced while launching or supervising the daemon process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Bootstrapping the daemon failed.
    #[error("daemon bootstrap failed: {source}")]
    Bootstrap {
        /// Underlying bootstrap error.
        #[from]
        source: BootstrapError,
    },
    /// Serving or stopping the daemon failed.
    #[error("daemon runtime failed: {source}")]
    Runtime {
        /// Underlying runtime error.
        #[from]
        source: RuntimeError,
    },
    /// Waiting for shutdown failed.
    #[error("failed to await shutdown signal: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[from]
        source: ShutdownError,
    },
}
