//! Task pool handle and the actor that owns the pool state.
//!
//! Every operation is a [`Command`] on one unbounded channel. A single actor
//! task drains the channel, applies each command to [`PoolState`] and then
//! performs the resulting effects before taking the next command. Callers
//! never block on admission; results arrive through their callback.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::error::{LinkpoolError, Result};
use crate::pool::state::{Callback, Effect, PoolSnapshot, PoolState, RunId};
use crate::pool::task::{Completion, PoolTask};

/// Default number of tasks allowed to run at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 6;

/// Configuration for a [`TaskPool`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of tasks running at once.
    pub max_concurrency: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl PoolConfig {
    pub fn new(max_concurrency: usize) -> Self {
        Self { max_concurrency }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(LinkpoolError::InvalidConfig(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

enum Command<T: PoolTask> {
    Submit {
        task: T,
        callback: Callback<T::Output>,
    },
    Cancel {
        identity: T::Key,
    },
    Finished {
        identity: T::Key,
        run: RunId,
        result: Option<T::Output>,
    },
    Snapshot {
        reply: oneshot::Sender<PoolSnapshot<T::Key>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running task pool. Cheap to clone.
///
/// The actor stops after [`TaskPool::shutdown`], or once every handle is
/// dropped and in-flight tasks have reported.
pub struct TaskPool<T: PoolTask> {
    tx: mpsc::UnboundedSender<Command<T>>,
    max_concurrency: usize,
}

impl<T: PoolTask> Clone for TaskPool<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            max_concurrency: self.max_concurrency,
        }
    }
}

impl<T: PoolTask> fmt::Debug for TaskPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskPool")
            .field("max_concurrency", &self.max_concurrency)
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl<T: PoolTask> TaskPool<T> {
    /// Spawn the pool actor on the current tokio runtime.
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let actor = PoolActor {
            state: PoolState::new(config.max_concurrency),
            rx,
            tx: tx.downgrade(),
        };
        tokio::spawn(actor.run());

        tracing::info!(max_concurrency = config.max_concurrency, "Task pool started");
        Ok(Self {
            tx,
            max_concurrency: config.max_concurrency,
        })
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Request `task`; `on_complete` receives the result, or `None` on
    /// failure. Returns as soon as the request is queued for the actor.
    pub fn submit<F>(&self, task: T, on_complete: F) -> Result<()>
    where
        F: FnOnce(Option<T::Output>) + Send + 'static,
    {
        self.send(Command::Submit {
            task,
            callback: Box::new(on_complete),
        })
    }

    /// Submit `task` and wait for its result.
    ///
    /// Resolves to `None` when the fetch fails, or when the request is
    /// canceled or the pool shuts down before it finishes.
    pub async fn request(&self, task: T) -> Result<Option<T::Output>> {
        let (reply, rx) = oneshot::channel();
        self.submit(task, move |result| {
            let _ = reply.send(result);
        })?;
        Ok(rx.await.ok().flatten())
    }

    /// Drop the request for `identity`. Its callbacks are never invoked.
    pub fn cancel(&self, identity: T::Key) -> Result<()> {
        self.send(Command::Cancel { identity })
    }

    pub async fn snapshot(&self) -> Result<PoolSnapshot<T::Key>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply })?;
        rx.await.map_err(|_| LinkpoolError::PoolClosed)
    }

    /// Cancel everything and stop the actor.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Shutdown { reply })?;
        rx.await.map_err(|_| LinkpoolError::PoolClosed)
    }

    fn send(&self, command: Command<T>) -> Result<()> {
        self.tx.send(command).map_err(|_| LinkpoolError::PoolClosed)
    }
}

struct PoolActor<T: PoolTask> {
    state: PoolState<T>,
    rx: mpsc::UnboundedReceiver<Command<T>>,
    // Weak so that dropping every handle lets the actor wind down
    tx: mpsc::WeakUnboundedSender<Command<T>>,
}

impl<T: PoolTask> PoolActor<T> {
    async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            let effects = match command {
                Command::Submit { task, callback } => self.state.submit(task, callback),
                Command::Cancel { identity } => self.state.cancel(&identity),
                Command::Finished { identity, run, result } => self.state.finish(&identity, run, result),
                Command::Snapshot { reply } => {
                    let _ = reply.send(self.state.snapshot());
                    continue;
                }
                Command::Shutdown { reply } => {
                    let effects = self.state.shutdown();
                    self.perform(effects);
                    self.rx.close();
                    let _ = reply.send(());
                    tracing::info!("Task pool shut down");
                    return;
                }
            };
            self.perform(effects);
            tracing::trace!(
                active = self.state.active_len(),
                waiting = self.state.waiting_len(),
                "Pool state"
            );
        }

        let effects = self.state.shutdown();
        if !effects.is_empty() {
            tracing::debug!(pending = effects.len(), "Task pool dropped with pending work");
        }
        self.perform(effects);
    }

    fn perform(&self, effects: Vec<Effect<T>>) {
        for effect in effects {
            match effect {
                Effect::Start { task, identity, run } => match self.tx.upgrade() {
                    Some(tx) => {
                        let description = task.description();
                        tracing::debug!(task = %description, run, "Starting task");
                        let completion = Completion::new(move |result| {
                            let _ = tx.send(Command::Finished { identity, run, result });
                        });
                        // A panicking start drops its completion, which reports failure
                        guarded(&description, "start", || task.start(completion));
                    }
                    // Every handle is gone; nothing could observe the result
                    None => task.cancel(),
                },
                Effect::Cancel { task } => {
                    tracing::debug!(task = %task.description(), "Canceling task");
                    task.cancel();
                }
                Effect::Deliver { callbacks, result } => {
                    for callback in callbacks {
                        let result = result.clone();
                        guarded("callback", "deliver", move || callback(result));
                    }
                }
            }
        }
    }
}

/// Run caller-supplied code so that a panic stays local to its identity.
fn guarded(subject: &str, stage: &str, f: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic".to_string());
        tracing::error!(subject, stage, panic = %message, "Recovered from panic");
    }
}
