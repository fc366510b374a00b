//! Periodic time broadcast.
//!
//! At most one periodic job backs the broadcast. Arming withdraws the current
//! job before submitting its replacement, so repeated start requests never
//! accumulate jobs.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::scheduler::{JobId, Scheduler};

use super::methods::current_time;
use super::notify::Notifier;
use super::DISPATCH_TARGET;

/// Event name used for time notifications.
pub const TIME_EVENT: &str = "time";

/// Owns the single periodic time-notification job.
#[derive(Debug)]
pub struct NotificationTimer {
    scheduler: Scheduler,
    notifier: Arc<Notifier>,
    active: Mutex<Option<JobId>>,
}

impl NotificationTimer {
    /// Creates a disarmed timer.
    pub fn new(scheduler: Scheduler, notifier: Arc<Notifier>) -> Self {
        Self {
            scheduler,
            notifier,
            active: Mutex::new(None),
        }
    }

    /// Replaces the broadcast job with one firing every `interval`.
    ///
    /// A zero interval only withdraws the current job.
    pub fn arm(&self, interval: Duration) -> Option<JobId> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = active.take() {
            self.scheduler.withdraw(previous);
        }
        if interval.is_zero() {
            info!(target: DISPATCH_TARGET, "time notifications stopped");
            return None;
        }
        let notifier = Arc::clone(&self.notifier);
        let job = self
            .scheduler
            .submit_periodic(interval, move || {
                broadcast_time(&notifier);
            });
        info!(
            target: DISPATCH_TARGET,
            job = %job,
            interval_secs = interval.as_secs(),
            "time notifications armed"
        );
        *active = Some(job);
        Some(job)
    }

    /// Identity of the current broadcast job, if armed.
    pub fn active(&self) -> Option<JobId> {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Sends the current time to every `time` subscriber.
pub(crate) fn broadcast_time(notifier: &Notifier) -> usize {
    match current_time() {
        Ok(now) => notifier.notify(TIME_EVENT, &Value::String(now), None),
        Err(error) => {
            warn!(target: DISPATCH_TARGET, %error, "failed to format time");
            0
        }
    }
}
