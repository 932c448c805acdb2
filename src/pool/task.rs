//! The contract every unit of pooled work implements.
//!
//! A task is identity-bearing (for dedup), priority-bearing (for admission and
//! preemption), startable and cancelable. The pool is the only caller of
//! `start` and `cancel`.

use std::fmt;
use std::hash::Hash;

use chrono::Utc;

/// Freshness of a request. Higher = more recent = runs first.
///
/// Priorities are request timestamps in microseconds, so the most recently
/// requested work wins a contested slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Priority(pub i64);

impl Priority {
    /// Priority stamped with the current wall-clock time.
    pub fn now() -> Self {
        Self(Utc::now().timestamp_micros())
    }

    pub fn value(self) -> i64 {
        self.0
    }
}

impl From<i64> for Priority {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One-shot completion handle passed to [`PoolTask::start`].
///
/// Reporting is exactly-once: `complete` consumes the handle, and dropping an
/// unreported handle reports `None`. An aborted fetch therefore still tells
/// the pool its attempt is over.
pub struct Completion<O> {
    notify: Option<Box<dyn FnOnce(Option<O>) + Send>>,
}

impl<O> Completion<O> {
    /// Wrap a notification closure.
    pub fn new(notify: impl FnOnce(Option<O>) + Send + 'static) -> Self {
        Self {
            notify: Some(Box::new(notify)),
        }
    }

    /// Report the attempt's result. `None` means failed or canceled.
    pub fn complete(mut self, result: Option<O>) {
        if let Some(notify) = self.notify.take() {
            notify(result);
        }
    }
}

impl<O> Drop for Completion<O> {
    fn drop(&mut self) {
        if let Some(notify) = self.notify.take() {
            notify(None);
        }
    }
}

impl<O> fmt::Debug for Completion<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("pending", &self.notify.is_some())
            .finish()
    }
}

/// A cancelable, startable, identity-bearing fetch.
pub trait PoolTask: Send + Sync + 'static {
    /// Dedup key. Two tasks with equal keys are the same logical request.
    type Key: Clone + Eq + Hash + fmt::Debug + Send + 'static;
    /// Value delivered to every caller waiting on this key.
    type Output: Clone + Send + 'static;

    /// Stable equality key for deduplication.
    fn identity(&self) -> Self::Key;

    /// Freshness at submission time. The pool keeps the current value on its
    /// own entry and refreshes it on re-request.
    fn priority(&self) -> Priority;

    /// Diagnostic label; no behavioral effect.
    fn description(&self) -> String {
        format!("{:?}", self.identity())
    }

    /// Begin the fetch. `completion` must be reported (or dropped) exactly once
    /// per call. The pool may call `start` again after a `cancel`.
    fn start(&self, completion: Completion<Self::Output>);

    /// Best-effort early termination. Idempotent, and must not report through
    /// the completion itself.
    fn cancel(&self);
}
