//! Worker pool for independent runs and cases.
//!
//! N tokio tasks pull jobs from a shared queue. A job runs end-to-end on
//! the worker that took it; results come back in submission order.

use crate::result::{RecastError, RecastResult};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Fixed-size pool of tokio worker tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    workers: usize,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(1)
    }
}

impl WorkerPool {
    /// Pool with `workers` tasks (at least one)
    #[must_use]
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Number of worker tasks
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Run `job` over every item, at most `workers` at a time.
    ///
    /// # Errors
    ///
    /// Returns [`RecastError::Worker`] if a worker task panicked.
    pub async fn run<T, R, F, Fut>(&self, items: Vec<T>, job: F) -> RecastResult<Vec<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let total = items.len();
        let queue: Arc<Mutex<VecDeque<(usize, T)>>> =
            Arc::new(Mutex::new(items.into_iter().enumerate().collect()));
        let job = Arc::new(job);
        let mut handles = Vec::new();

        for worker_id in 0..self.workers.min(total) {
            let queue = Arc::clone(&queue);
            let job = Arc::clone(&job);
            handles.push(tokio::spawn(async move {
                let mut done = Vec::new();
                loop {
                    let next = queue.lock().await.pop_front();
                    let Some((index, item)) = next else {
                        break;
                    };
                    debug!(worker_id, index, "job started");
                    done.push((index, job(item).await));
                }
                done
            }));
        }

        let mut slots: Vec<Option<R>> = std::iter::repeat_with(|| None).take(total).collect();
        for handle in handles {
            let done = handle.await.map_err(|e| RecastError::Worker {
                message: e.to_string(),
            })?;
            for (index, result) in done {
                slots[index] = Some(result);
            }
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| RecastError::Worker {
                    message: format!("job {index} produced no result"),
                })
            })
            .collect()
    }
}
