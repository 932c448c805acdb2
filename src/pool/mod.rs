//! Bounded, priority-preempting task pool.
//!
//! This module provides:
//! - **PoolTask**: the contract a unit of work implements (identity, priority,
//!   start, cancel).
//! - **TaskPool**: admission control, dedup by identity, preemption of the
//!   stalest running task, and fan-out of one result to every requester.
//!
//! # Architecture
//!
//! The pool is a single-writer actor:
//! 1. `submit`/`cancel` enqueue a command and return immediately
//! 2. The actor applies the command to `PoolState` (pure bookkeeping)
//! 3. The actor performs the resulting effects: start, cancel, deliver
//! 4. Tasks report back through their `Completion`, which enqueues a command
//!
//! # Example
//!
//! ```ignore
//! use linkpool::pool::{PoolConfig, TaskPool};
//!
//! let pool = TaskPool::new(PoolConfig::new(6))?;
//! pool.submit(task, |result| println!("{result:?}"))?;
//! ```

mod actor;
mod lane;
mod state;
mod task;

pub use actor::{DEFAULT_MAX_CONCURRENCY, PoolConfig, TaskPool};
pub use state::{PoolSnapshot, PoolStats};
pub use task::{Completion, PoolTask, Priority};
