//! Process-wide bounded pool for remote calls.
//!
//! The pool is created once at startup and closed on shutdown. Request
//! handlers submit a call with [`WorkerPool::run`] and wait for its output;
//! at most `size` calls execute at once across all requests.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::PoolError;

/// Default number of concurrent remote calls.
pub const DEFAULT_WORKERS: usize = 3;

/// Bounded task pool backed by a semaphore.
pub struct WorkerPool {
    slots: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Create a pool with `size` slots (minimum 1).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            slots: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Slots not currently held by a running call.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Run `task` on the pool and wait for its output.
    ///
    /// Waits for a free slot first. The task runs on its own tokio task, so a
    /// panic inside it is reported as [`PoolError::TaskFailed`].
    pub async fn run<F>(&self, task: F) -> Result<F::Output, PoolError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;

        debug!(available = self.slots.available_permits(), "Worker slot acquired");

        let handle = tokio::spawn(async move {
            let output = task.await;
            drop(permit);
            output
        });

        handle
            .await
            .map_err(|e| PoolError::TaskFailed(e.to_string()))
    }

    /// Stop accepting new calls. Calls already running finish normally.
    pub fn shutdown(&self) {
        self.slots.close();
    }

    pub fn is_shut_down(&self) -> bool {
        self.slots.is_closed()
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}
