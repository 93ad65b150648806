//! Serialized, spaced execution of outbound inference calls.
//!
//! Backends tolerate exactly one in-flight request at a time and a minimum
//! spacing between call starts. A single worker task drains a FIFO queue,
//! sleeping out the remaining interval before starting each call. A failing
//! call only rejects its own caller; the queue keeps moving.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::Future;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::debug;

/// Minimum spacing between successive call starts.
pub const MIN_INTERVAL: Duration = Duration::from_millis(500);

/// Fixed pause after each call before the next queue entry is popped.
const DRAIN_DELAY: Duration = Duration::from_millis(50);

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

#[derive(Debug, Error)]
pub enum ThrottleError {
    /// The worker task is gone; no further calls can run.
    #[error("request queue is closed")]
    Closed,
}

/// FIFO throttler with a single worker and enforced inter-call spacing.
pub struct RequestThrottler {
    queue: mpsc::UnboundedSender<Job>,
}

impl RequestThrottler {
    pub fn new() -> Self {
        Self::with_interval(MIN_INTERVAL)
    }

    pub fn with_interval(min_interval: Duration) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        tokio::spawn(async move {
            let mut last_start: Option<Instant> = None;
            while let Some(job) = rx.recv().await {
                if let Some(prev) = last_start {
                    let elapsed = prev.elapsed();
                    if elapsed < min_interval {
                        let wait = min_interval - elapsed;
                        debug!("throttling next call for {:?}", wait);
                        tokio::time::sleep(wait).await;
                    }
                }
                last_start = Some(Instant::now());
                job().await;
                tokio::time::sleep(DRAIN_DELAY).await;
            }
        });

        Self { queue: tx }
    }

    /// Queue a call and await its result.
    ///
    /// Calls execute strictly in submission order, one at a time. The call's
    /// own outcome (including errors) is routed back to this caller only.
    pub async fn execute<T, Fut, F>(&self, call: F) -> Result<T, ThrottleError>
    where
        T: Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            Box::pin(async move {
                let result = call().await;
                let _ = done_tx.send(result);
            })
        });

        self.queue.send(job).map_err(|_| ThrottleError::Closed)?;
        done_rx.await.map_err(|_| ThrottleError::Closed)
    }
}

impl Default for RequestThrottler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test(start_paused = true)]
    async fn calls_run_in_fifo_order_with_spacing() {
        let throttler = Arc::new(RequestThrottler::with_interval(Duration::from_millis(500)));
        let starts: Arc<Mutex<Vec<(usize, Instant)>>> = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..3 {
            let throttler = throttler.clone();
            let starts = starts.clone();
            handles.push(tokio::spawn(async move {
                throttler
                    .execute(move || async move {
                        starts.lock().unwrap().push((i, Instant::now()));
                        i
                    })
                    .await
                    .unwrap()
            }));
            // Make submission order deterministic.
            tokio::task::yield_now().await;
        }

        let mut results = Vec::new();
        for h in handles {
            results.push(h.await.unwrap());
        }
        assert_eq!(results, vec![0, 1, 2]);

        let starts = starts.lock().unwrap();
        let order: Vec<usize> = starts.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![0, 1, 2]);

        for pair in starts.windows(2) {
            let gap = pair[1].1 - pair[0].1;
            assert!(gap >= Duration::from_millis(500), "gap was {:?}", gap);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn a_failing_call_does_not_block_the_next() {
        let throttler = Arc::new(RequestThrottler::with_interval(Duration::from_millis(10)));

        let failing = throttler
            .execute(|| async { Err::<(), String>("boom".to_string()) })
            .await
            .unwrap();
        assert!(failing.is_err());

        let ok = throttler.execute(|| async { 42u32 }).await.unwrap();
        assert_eq!(ok, 42);
    }
}
