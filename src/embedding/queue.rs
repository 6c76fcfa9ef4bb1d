//! Process-wide ordered call queue for rate-limited providers.
//!
//! A single worker task runs submitted jobs one at a time in submission order
//! and sleeps `cooldown` after each. Callers await a future for their own result
//! and never touch queue state.

use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};

use crate::error::{HsgError, Result};

type Job = BoxFuture<'static, ()>;

pub struct SerialQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl SerialQueue {
    /// Spawn the worker. Must be called inside a tokio runtime.
    pub fn new(cooldown: Duration) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job.await;
                tokio::time::sleep(cooldown).await;
            }
            tracing::debug!("serial queue worker stopped");
        });
        Self { tx }
    }

    /// Enqueue `fut` immediately; the returned future resolves with its output.
    ///
    /// Ordering is fixed at call time, not when the returned future is first polled.
    pub fn submit<F, T>(&self, fut: F) -> impl Future<Output = Result<T>> + Send + 'static
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let _ = done_tx.send(fut.await);
        });
        let enqueued = self.tx.send(job).is_ok();

        async move {
            if !enqueued {
                return Err(HsgError::Internal("serial queue is closed".into()));
            }
            done_rx
                .await
                .map_err(|_| HsgError::Internal("serial queue dropped a job".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    #[tokio::test]
    async fn jobs_run_in_submission_order() {
        let queue = SerialQueue::new(Duration::from_millis(0));
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut pending = Vec::new();
        for i in 0..5u32 {
            let log = Arc::clone(&log);
            // later jobs sleep less, so only the queue keeps them ordered
            pending.push(queue.submit(async move {
                tokio::time::sleep(Duration::from_millis(u64::from(5 - i) * 5)).await;
                log.lock().unwrap().push(i);
                i
            }));
        }

        let results = futures::future::join_all(pending).await;
        let results: Vec<u32> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(results, vec![0, 1, 2, 3, 4]);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn cooldown_spaces_consecutive_jobs() {
        let queue = SerialQueue::new(Duration::from_millis(50));
        let start = Instant::now();
        let first = queue.submit(async { Instant::now() });
        let second = queue.submit(async { Instant::now() });

        let (a, b) = futures::future::join(first, second).await;
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(a - start < Duration::from_millis(40));
        assert!(b - a >= Duration::from_millis(50));
    }
}
