//! Admission, dedup, preemption and fan-out bookkeeping.
//!
//! `PoolState` is a synchronous state machine. Every operation mutates the
//! active/waiting lanes and returns the [`Effect`]s the owner must perform,
//! in order. It never calls into a task or a callback itself, so the actor
//! that owns it stays the single writer even when a task completes
//! synchronously from inside `start`.

use std::sync::Arc;

use serde::Serialize;

use crate::pool::lane::{Lane, Rank};
use crate::pool::task::{PoolTask, Priority};

/// Caller continuation registered for an identity.
pub type Callback<O> = Box<dyn FnOnce(Option<O>) + Send>;

/// Identifies one start attempt of an entry.
pub type RunId = u64;

/// Side effect produced by a state transition.
pub enum Effect<T: PoolTask> {
    /// Start `task`; its completion must report back with `run`.
    Start { task: Arc<T>, identity: T::Key, run: RunId },
    /// Ask `task` to stop early.
    Cancel { task: Arc<T> },
    /// Invoke every callback, in order, with `result`.
    Deliver {
        callbacks: Vec<Callback<T::Output>>,
        result: Option<T::Output>,
    },
}

/// Running counters, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub submitted: u64,
    pub deduplicated: u64,
    pub preempted: u64,
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub canceled: u64,
    pub stale: u64,
}

/// Point-in-time view of the pool. Keys are ordered lowest to highest priority.
#[derive(Debug, Clone)]
pub struct PoolSnapshot<K> {
    pub max_concurrency: usize,
    pub active: Vec<K>,
    pub waiting: Vec<K>,
    pub stats: PoolStats,
}

struct WorkItem<T: PoolTask> {
    task: Arc<T>,
    callbacks: Vec<Callback<T::Output>>,
    run: Option<RunId>,
}

pub struct PoolState<T: PoolTask> {
    max_concurrency: usize,
    active: Lane<T::Key, WorkItem<T>>,
    waiting: Lane<T::Key, WorkItem<T>>,
    next_seq: u64,
    next_run: RunId,
    stats: PoolStats,
}

impl<T: PoolTask> PoolState<T> {
    pub fn new(max_concurrency: usize) -> Self {
        debug_assert!(max_concurrency > 0);
        Self {
            max_concurrency,
            active: Lane::new(),
            waiting: Lane::new(),
            next_seq: 0,
            next_run: 0,
            stats: PoolStats::default(),
        }
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    pub fn snapshot(&self) -> PoolSnapshot<T::Key> {
        PoolSnapshot {
            max_concurrency: self.max_concurrency,
            active: self.active.keys().cloned().collect(),
            waiting: self.waiting.keys().cloned().collect(),
            stats: self.stats,
        }
    }

    /// Accept a request for `task`, deduplicating by identity.
    pub fn submit(&mut self, task: T, callback: Callback<T::Output>) -> Vec<Effect<T>> {
        let identity = task.identity();
        let priority = task.priority();
        self.stats.submitted += 1;

        // Already running: re-rank and piggyback on the in-flight fetch
        if let Some((_, mut item)) = self.active.remove(&identity) {
            item.callbacks.push(callback);
            let rank = self.rank(priority);
            tracing::debug!(
                task = %task.description(),
                callbacks = item.callbacks.len(),
                "Joined active request"
            );
            self.active.insert(identity, rank, item);
            self.stats.deduplicated += 1;
            self.check_invariants();
            return Vec::new();
        }

        // Waiting: the fresh submission replaces the entry and inherits its callers
        let mut callbacks = Vec::with_capacity(1);
        if let Some((_, stale)) = self.waiting.remove(&identity) {
            callbacks = stale.callbacks;
            self.stats.deduplicated += 1;
            tracing::debug!(
                task = %task.description(),
                merged = callbacks.len(),
                "Replaced waiting request"
            );
        }
        callbacks.push(callback);

        let mut effects = self.preempt_for(priority);

        let item = WorkItem {
            task: Arc::new(task),
            callbacks,
            run: None,
        };
        let rank = self.rank(priority);
        if self.active.len() < self.max_concurrency {
            effects.push(self.activate(identity, rank, item));
        } else {
            tracing::debug!(
                task = %item.task.description(),
                waiting = self.waiting.len() + 1,
                "Pool full, queued request"
            );
            self.waiting.insert(identity, rank, item);
        }

        self.check_invariants();
        effects
    }

    /// Drop the entry for `identity` without notifying its callers.
    pub fn cancel(&mut self, identity: &T::Key) -> Vec<Effect<T>> {
        let mut effects = Vec::new();

        if let Some((_, item)) = self.active.remove(identity) {
            tracing::debug!(task = %item.task.description(), "Canceled active request");
            self.stats.canceled += 1;
            effects.push(Effect::Cancel { task: item.task });
            effects.extend(self.backfill());
        } else if let Some((_, item)) = self.waiting.remove(identity) {
            tracing::debug!(task = %item.task.description(), "Canceled waiting request");
            self.stats.canceled += 1;
            effects.push(Effect::Cancel { task: item.task });
        }

        self.check_invariants();
        effects
    }

    /// Record the end of attempt `run` for `identity`.
    ///
    /// Completions from attempts that are no longer current (preempted,
    /// canceled, or already finished) are ignored.
    pub fn finish(&mut self, identity: &T::Key, run: RunId, result: Option<T::Output>) -> Vec<Effect<T>> {
        let current = self.active.get(identity).and_then(|item| item.run);
        if current != Some(run) {
            tracing::trace!(identity = ?identity, run, "Ignored stale completion");
            self.stats.stale += 1;
            return Vec::new();
        }

        let mut effects = Vec::new();
        if let Some((_, item)) = self.active.remove(identity) {
            if result.is_some() {
                self.stats.completed += 1;
            } else {
                self.stats.failed += 1;
            }
            tracing::debug!(
                task = %item.task.description(),
                callbacks = item.callbacks.len(),
                success = result.is_some(),
                "Request finished"
            );
            effects.push(Effect::Deliver {
                callbacks: item.callbacks,
                result,
            });
        }
        // A late completion must never leave a twin behind
        self.waiting.remove(identity);

        effects.extend(self.backfill());
        self.check_invariants();
        effects
    }

    /// Cancel and drop every entry. Callbacks are dropped, not invoked.
    pub fn shutdown(&mut self) -> Vec<Effect<T>> {
        let active = self.active.drain();
        let waiting = self.waiting.drain();
        self.stats.canceled += (active.len() + waiting.len()) as u64;

        active
            .into_iter()
            .chain(waiting)
            .map(|(_, item)| Effect::Cancel { task: item.task })
            .collect()
    }

    fn rank(&mut self, priority: Priority) -> Rank {
        let seq = self.next_seq;
        self.next_seq += 1;
        Rank::new(priority, seq)
    }

    /// Evict lower-priority active entries until `priority` fits or nothing
    /// older remains.
    fn preempt_for(&mut self, priority: Priority) -> Vec<Effect<T>> {
        let mut effects = Vec::new();

        while self.active.len() >= self.max_concurrency {
            match self.active.lowest_rank() {
                Some(lowest) if priority > lowest.priority => {}
                _ => break,
            }
            let Some((key, rank, mut victim)) = self.active.pop_lowest() else {
                break;
            };
            victim.run = None;
            tracing::debug!(
                task = %victim.task.description(),
                priority = %rank.priority,
                "Preempted for fresher request"
            );
            effects.push(Effect::Cancel {
                task: Arc::clone(&victim.task),
            });
            self.waiting.insert(key, rank, victim);
            self.stats.preempted += 1;
        }

        effects
    }

    /// Promote the highest-priority waiting entry into one free slot.
    fn backfill(&mut self) -> Option<Effect<T>> {
        if self.active.len() >= self.max_concurrency || self.waiting.is_empty() {
            return None;
        }
        let (key, rank, item) = self.waiting.pop_highest()?;
        tracing::debug!(task = %item.task.description(), "Promoted waiting request");
        Some(self.activate(key, rank, item))
    }

    fn activate(&mut self, identity: T::Key, rank: Rank, mut item: WorkItem<T>) -> Effect<T> {
        let run = self.next_run;
        self.next_run += 1;
        item.run = Some(run);
        self.stats.started += 1;

        let task = Arc::clone(&item.task);
        self.active.insert(identity.clone(), rank, item);
        Effect::Start { task, identity, run }
    }

    fn check_invariants(&self) {
        debug_assert!(self.active.len() <= self.max_concurrency, "active set over capacity");
        debug_assert!(
            self.active.keys().all(|key| !self.waiting.contains(key)),
            "identity present in both active and waiting"
        );
    }
}
