//! Due-time ordered job storage.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use crate::connection::ConnectionId;

/// Identity of a submitted job, stable across periodic re-submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub(crate) u64);

impl fmt::Display for JobId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "job-{}", self.0)
    }
}

/// Callback fired by a periodic job.
pub type PeriodicCallback = Box<dyn FnMut() + Send>;

/// Callback fired once by a connection-scoped job.
pub type OneShotCallback = Box<dyn FnOnce(ConnectionId) + Send>;

/// Work owned by the scheduler until it fires.
pub enum ScheduledJob {
    /// Re-submitted after each firing while `interval` is non-zero.
    Periodic {
        /// Delay between firings.
        interval: Duration,
        /// Invoked on each firing.
        callback: PeriodicCallback,
    },
    /// Fired once for `connection`, then discarded.
    OneShot {
        /// Connection the callback is bound to.
        connection: ConnectionId,
        /// Invoked on firing.
        callback: OneShotCallback,
    },
}

impl ScheduledJob {
    pub(crate) fn is_periodic(&self) -> bool {
        matches!(self, Self::Periodic { .. })
    }
}

impl fmt::Debug for ScheduledJob {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Periodic { interval, .. } => formatter
                .debug_struct("Periodic")
                .field("interval", interval)
                .finish_non_exhaustive(),
            Self::OneShot { connection, .. } => formatter
                .debug_struct("OneShot")
                .field("connection", connection)
                .finish_non_exhaustive(),
        }
    }
}

/// Min-ordered queue keyed by `(due, id)`.
///
/// The id breaks ties so jobs sharing a due time fire in submission order.
#[derive(Debug, Default)]
pub(crate) struct JobQueue {
    by_due: BTreeMap<(Duration, JobId), ScheduledJob>,
    due_of: HashMap<JobId, Duration>,
}

impl JobQueue {
    pub(crate) fn insert(&mut self, id: JobId, due: Duration, job: ScheduledJob) {
        if let Some(previous) = self.due_of.insert(id, due) {
            self.by_due.remove(&(previous, id));
        }
        self.by_due.insert((due, id), job);
    }

    pub(crate) fn remove(&mut self, id: JobId) -> Option<ScheduledJob> {
        let due = self.due_of.remove(&id)?;
        self.by_due.remove(&(due, id))
    }

    pub(crate) fn contains(&self, id: JobId) -> bool {
        self.due_of.contains_key(&id)
    }

    pub(crate) fn next_due(&self) -> Option<Duration> {
        self.by_due.keys().next().map(|(due, _)| *due)
    }

    /// Removes and returns the earliest job if it is due at `now`.
    pub(crate) fn pop_due(&mut self, now: Duration) -> Option<(JobId, ScheduledJob)> {
        let due = self.next_due()?;
        if due > now {
            return None;
        }
        let ((_, id), job) = self.by_due.pop_first()?;
        self.due_of.remove(&id);
        Some((id, job))
    }

    /// Replaces a queued periodic job's interval. Returns false for unknown or
    /// one-shot jobs.
    pub(crate) fn set_interval(&mut self, id: JobId, next: Duration) -> bool {
        let Some(due) = self.due_of.get(&id) else {
            return false;
        };
        match self.by_due.get_mut(&(*due, id)) {
            Some(ScheduledJob::Periodic { interval, .. }) => {
                *interval = next;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.by_due.len()
    }

    pub(crate) fn clear(&mut self) -> usize {
        let dropped = self.by_due.len();
        self.by_due.clear();
        self.due_of.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn periodic(millis: u64) -> ScheduledJob {
        ScheduledJob::Periodic {
            interval: Duration::from_millis(millis),
            callback: Box::new(|| {}),
        }
    }

    #[test]
    fn pops_in_due_order_then_id_order() {
        let mut queue = JobQueue::default();
        queue.insert(JobId(1), Duration::from_millis(100), periodic(1));
        queue.insert(JobId(2), Duration::from_millis(50), periodic(1));
        queue.insert(JobId(3), Duration::from_millis(50), periodic(1));

        let now = Duration::from_millis(500);
        let order: Vec<_> = std::iter::from_fn(|| queue.pop_due(now).map(|(id, _)| id)).collect();
        assert_eq!(order, vec![JobId(2), JobId(3), JobId(1)]);
    }

    #[test]
    fn pop_due_respects_now() {
        let mut queue = JobQueue::default();
        queue.insert(JobId(1), Duration::from_millis(100), periodic(1));
        assert!(queue.pop_due(Duration::from_millis(99)).is_none());
        assert!(queue.pop_due(Duration::from_millis(100)).is_some());
    }

    #[test]
    fn reinsert_moves_the_entry() {
        let mut queue = JobQueue::default();
        queue.insert(JobId(1), Duration::from_millis(100), periodic(1));
        queue.insert(JobId(1), Duration::from_millis(10), periodic(1));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_due(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn set_interval_ignores_one_shots() {
        let mut queue = JobQueue::default();
        queue.insert(
            JobId(4),
            Duration::ZERO,
            ScheduledJob::OneShot {
                connection: ConnectionId::new(1),
                callback: Box::new(|_| {}),
            },
        );
        assert!(!queue.set_interval(JobId(4), Duration::from_secs(1)));
        assert!(queue.remove(JobId(4)).is_some());
        assert!(!queue.contains(JobId(4)));
    }
}
