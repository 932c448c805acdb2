//! Adapter from async fetches to [`PoolTask`].
//!
//! Most work is naturally an `async fn`. [`FetchTask`] runs such a fetch on
//! the tokio runtime when the pool starts it and aborts it when the pool
//! cancels it.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::AbortHandle;

use crate::error::{LinkpoolError, Result};
use crate::pool::{Completion, PoolTask, Priority};

/// An asynchronous, repeatable fetch of one resource.
#[async_trait]
pub trait Fetch: Send + Sync + 'static {
    type Key: Clone + Eq + Hash + Debug + Send + 'static;
    type Output: Clone + Send + 'static;

    /// Domain key of the resource (e.g. the normalized URL).
    fn key(&self) -> Self::Key;

    /// Human-readable label for logs.
    fn label(&self) -> String;

    /// Fetch the resource. May be called again after an aborted attempt.
    async fn fetch(&self) -> Result<Self::Output>;
}

/// [`PoolTask`] that spawns a [`Fetch`] per attempt.
pub struct FetchTask<F: Fetch> {
    fetcher: Arc<F>,
    priority: Priority,
    timeout: Option<Duration>,
    attempt: Mutex<Option<AbortHandle>>,
}

impl<F: Fetch> FetchTask<F> {
    /// Wrap `fetcher`, stamped with the current time as its priority.
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            priority: Priority::now(),
            timeout: None,
            attempt: Mutex::new(None),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Give up on an attempt (reporting `None`) after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }
}

impl<F: Fetch> PoolTask for FetchTask<F> {
    type Key = F::Key;
    type Output = F::Output;

    fn identity(&self) -> F::Key {
        self.fetcher.key()
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn description(&self) -> String {
        self.fetcher.label()
    }

    fn start(&self, completion: Completion<F::Output>) {
        let fetcher = Arc::clone(&self.fetcher);
        let timeout = self.timeout;

        let handle = tokio::spawn(async move {
            let outcome = match timeout {
                Some(limit) => match tokio::time::timeout(limit, fetcher.fetch()).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(LinkpoolError::Timeout(limit)),
                },
                None => fetcher.fetch().await,
            };

            match outcome {
                Ok(value) => completion.complete(Some(value)),
                Err(e) => {
                    tracing::warn!(task = %fetcher.label(), error = %e, "Fetch failed");
                    completion.complete(None);
                }
            }
        });

        let mut attempt = self.attempt.lock().unwrap_or_else(|e| e.into_inner());
        *attempt = Some(handle.abort_handle());
    }

    fn cancel(&self) {
        let mut attempt = self.attempt.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = attempt.take() {
            handle.abort();
        }
    }
}
