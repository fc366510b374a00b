//! Due-time ordered job scheduling.
//!
//! Jobs live in a single queue ordered by absolute due time on an injectable
//! [`Clock`]. Periodic jobs are re-queued after each firing at the firing time
//! plus their interval; one-shot jobs are bound to a caller connection and are
//! discarded once fired. Callbacks run with the queue lock released, so a
//! callback may submit or withdraw jobs.
//!
//! The runtime thread started by [`Scheduler::start`] blocks on a condition
//! variable until the earliest job is due. Submitting a job wakes it so an
//! earlier job is never left waiting behind a later one.

mod clock;
mod queue;

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, trace};

use crate::connection::ConnectionId;

pub use clock::{Clock, ManualClock, SystemClock};
pub use queue::{JobId, OneShotCallback, PeriodicCallback, ScheduledJob};

use queue::JobQueue;

/// Tracing target for scheduler operations.
pub(crate) const SCHEDULER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::scheduler");

/// Errors raised when managing the scheduler runtime thread.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The runtime thread could not be spawned.
    #[error("failed to spawn scheduler thread: {source}")]
    Spawn {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The runtime thread panicked.
    #[error("scheduler thread panicked")]
    ThreadPanic,
}

/// State of a periodic job whose callback is running.
#[derive(Debug, Default)]
struct InFlight {
    cancelled: bool,
    interval: Option<Duration>,
}

#[derive(Debug, Default)]
struct State {
    queue: JobQueue,
    in_flight: HashMap<JobId, InFlight>,
}

struct Shared {
    state: Mutex<State>,
    wakeup: Condvar,
    clock: Arc<dyn Clock>,
    next_id: AtomicU64,
    stopping: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle used to submit, withdraw and fire jobs.
///
/// Clones share the same queue.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    /// Creates an empty scheduler reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                wakeup: Condvar::new(),
                clock,
                next_id: AtomicU64::new(1),
                stopping: AtomicBool::new(false),
            }),
        }
    }

    /// Current reading of the scheduler's clock.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.shared.clock.now()
    }

    /// Queues a job that fires every `interval`, first after one interval.
    pub fn submit_periodic<F>(&self, interval: Duration, callback: F) -> JobId
    where
        F: FnMut() + Send + 'static,
    {
        let job = ScheduledJob::Periodic {
            interval,
            callback: Box::new(callback),
        };
        self.submit(interval, job)
    }

    /// Queues a job that fires once for `connection` after `delay`.
    pub fn submit_once<F>(&self, delay: Duration, connection: ConnectionId, callback: F) -> JobId
    where
        F: FnOnce(ConnectionId) + Send + 'static,
    {
        let job = ScheduledJob::OneShot {
            connection,
            callback: Box::new(callback),
        };
        self.submit(delay, job)
    }

    fn submit(&self, delay: Duration, job: ScheduledJob) -> JobId {
        let id = JobId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let due = self.now().saturating_add(delay);
        debug!(
            target: SCHEDULER_TARGET,
            job = %id,
            kind = ?job,
            due_ms = due.as_millis(),
            "job submitted"
        );
        self.shared.lock().queue.insert(id, due, job);
        self.shared.wakeup.notify_all();
        id
    }

    /// Withdraws a job that has not started firing.
    ///
    /// Returns true only when the job was removed before firing. Withdrawing a
    /// periodic job whose callback is running returns false, but the job is
    /// not re-queued afterwards.
    pub fn withdraw(&self, id: JobId) -> bool {
        let mut state = self.shared.lock();
        if state.queue.remove(id).is_some() {
            debug!(target: SCHEDULER_TARGET, job = %id, "job withdrawn");
            return true;
        }
        if let Some(in_flight) = state.in_flight.get_mut(&id) {
            in_flight.cancelled = true;
            debug!(target: SCHEDULER_TARGET, job = %id, "running job will not recur");
        }
        false
    }

    /// Changes a periodic job's interval for its next re-submission.
    ///
    /// A zero interval ends the recurrence after the next firing. Returns
    /// false when no periodic job has this identity.
    pub fn set_interval(&self, id: JobId, interval: Duration) -> bool {
        let mut state = self.shared.lock();
        if state.queue.set_interval(id, interval) {
            return true;
        }
        match state.in_flight.get_mut(&id) {
            Some(in_flight) => {
                in_flight.interval = Some(interval);
                true
            }
            None => false,
        }
    }

    /// Number of queued jobs.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Whether `id` is queued or is a periodic job currently firing that will
    /// recur.
    #[must_use]
    pub fn is_pending(&self, id: JobId) -> bool {
        let state = self.shared.lock();
        state.queue.contains(id)
            || state
                .in_flight
                .get(&id)
                .is_some_and(|in_flight| !in_flight.cancelled)
    }

    /// Drops every queued job and stops running periodic jobs from recurring.
    pub fn clear(&self) -> usize {
        let mut state = self.shared.lock();
        for in_flight in state.in_flight.values_mut() {
            in_flight.cancelled = true;
        }
        let dropped = state.queue.clear();
        info!(target: SCHEDULER_TARGET, dropped, "scheduler cleared");
        dropped
    }

    /// Fires every job due at the current clock reading and returns how many
    /// fired.
    ///
    /// The clock is read once per pass and that reading is the firing time
    /// used to re-queue periodic jobs.
    pub fn run_pending(&self) -> usize {
        let now = self.now();
        let mut fired = 0;
        loop {
            let next = {
                let mut state = self.shared.lock();
                let popped = state.queue.pop_due(now);
                if let Some((id, job)) = &popped
                    && job.is_periodic()
                {
                    state.in_flight.insert(*id, InFlight::default());
                }
                popped
            };
            let Some((id, job)) = next else {
                break;
            };
            fired += 1;
            self.fire(id, job, now);
        }
        fired
    }

    fn fire(&self, id: JobId, job: ScheduledJob, now: Duration) {
        match job {
            ScheduledJob::OneShot {
                connection,
                callback,
            } => {
                trace!(target: SCHEDULER_TARGET, job = %id, %connection, "one-shot firing");
                callback(connection);
            }
            ScheduledJob::Periodic {
                interval,
                mut callback,
            } => {
                trace!(target: SCHEDULER_TARGET, job = %id, "periodic firing");
                callback();
                let mut state = self.shared.lock();
                let in_flight = state.in_flight.remove(&id).unwrap_or_default();
                let interval = in_flight.interval.unwrap_or(interval);
                if in_flight.cancelled || interval.is_zero() {
                    debug!(target: SCHEDULER_TARGET, job = %id, "periodic job finished");
                    return;
                }
                let due = now.saturating_add(interval);
                state
                    .queue
                    .insert(id, due, ScheduledJob::Periodic { interval, callback });
                self.shared.wakeup.notify_all();
            }
        }
    }

    /// Starts the runtime thread that fires jobs as they fall due.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Spawn`] when the thread cannot be created.
    pub fn start(&self) -> Result<SchedulerHandle, SchedulerError> {
        self.shared.stopping.store(false, Ordering::SeqCst);
        let scheduler = self.clone();
        let handle = thread::Builder::new()
            .name(concat!(env!("CARGO_PKG_NAME"), "-scheduler").to_string())
            .spawn(move || scheduler.run_loop())
            .map_err(|source| SchedulerError::Spawn { source })?;
        info!(target: SCHEDULER_TARGET, "scheduler runtime started");
        Ok(SchedulerHandle {
            shared: Arc::clone(&self.shared),
            handle: Some(handle),
        })
    }

    fn run_loop(&self) {
        let shared = &self.shared;
        let mut state = shared.lock();
        while !shared.stopping.load(Ordering::SeqCst) {
            let now = shared.clock.now();
            let next_due = state.queue.next_due();
            state = match next_due {
                Some(due) if due <= now => {
                    drop(state);
                    self.run_pending();
                    shared.lock()
                }
                Some(due) => shared
                    .wakeup
                    .wait_timeout(state, due.saturating_sub(now))
                    .map_or_else(|poisoned| poisoned.into_inner().0, |(guard, _)| guard),
                None => shared
                    .wakeup
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
        debug!(target: SCHEDULER_TARGET, "scheduler runtime stopped");
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Scheduler")
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

/// Handle to the scheduler runtime thread.
pub struct SchedulerHandle {
    shared: Arc<Shared>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Asks the runtime thread to stop after its current pass.
    pub fn shutdown(&self) {
        stop(&self.shared);
    }

    /// Waits for the runtime thread to exit.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ThreadPanic`] if the thread panicked.
    pub fn join(mut self) -> Result<(), SchedulerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| SchedulerError::ThreadPanic),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for SchedulerHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SchedulerHandle")
            .field("running", &self.handle.is_some())
            .finish_non_exhaustive()
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        stop(&self.shared);
    }
}

fn stop(shared: &Shared) {
    let _state = shared.lock();
    shared.stopping.store(true, Ordering::SeqCst);
    shared.wakeup.notify_all();
}
