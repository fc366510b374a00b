//! Supervises daemon launch sequencing and runtime orchestration.

use std::sync::Arc;

use tracing::info;

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::scheduler::{Clock, SystemClock};

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};

/// Collaborators required to launch the daemon runtime.
pub(crate) struct LaunchPlan<L, S> {
    pub(crate) loader: L,
    pub(crate) reporter: Arc<dyn HealthReporter>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) shutdown: S,
}

/// Runs the daemon using the production collaborators.
///
/// # Errors
///
/// Returns a [`LaunchError`] when bootstrap, binding or shutdown fails.
pub fn run_daemon() -> Result<(), LaunchError> {
    run_daemon_with(LaunchPlan {
        loader: SystemConfigLoader,
        reporter: Arc::new(StructuredHealthReporter::new()),
        clock: Arc::new(SystemClock::new()),
        shutdown: SystemShutdownSignal::new(),
    })
}

/// Runs the daemon with injected collaborators.
pub(crate) fn run_daemon_with<L, S>(plan: LaunchPlan<L, S>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    S: ShutdownSignal,
{
    let LaunchPlan {
        loader,
        reporter,
        clock,
        shutdown,
    } = plan;

    info!(target: PROCESS_TARGET, "starting daemon runtime");
    let mut daemon = bootstrap_with(&loader, reporter, clock)?;
    if let Err(error) = daemon.serve() {
        daemon.shutdown()?;
        return Err(error.into());
    }
    let waited = shutdown.wait();
    daemon.shutdown()?;
    waited?;
    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    Ok(())
}
