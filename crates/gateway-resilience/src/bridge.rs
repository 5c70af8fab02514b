//! Bridge from async callers to blocking upstream calls.
//!
//! Blocking work runs on tokio's blocking thread pool, gated by a semaphore
//! so at most `workers` calls are in flight at once. Submitting returns a
//! [`BridgeTask`] future immediately; dropping that future detaches the
//! call, which still runs to completion on its worker.

use async_stream::stream;
use futures::stream::BoxStream;
use gateway_core::{GatewayError, GatewayResult};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Bridge configuration
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Maximum concurrent blocking calls
    pub workers: usize,
    /// Chunks buffered between a streaming worker and its consumer
    pub stream_buffer: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            stream_buffer: 16,
        }
    }
}

/// Handle to a submitted blocking call
#[must_use = "a bridge task does nothing observable unless awaited"]
#[derive(Debug)]
pub struct BridgeTask<T> {
    handle: JoinHandle<GatewayResult<T>>,
}

impl<T> Future for BridgeTask<T> {
    type Output = GatewayResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|joined| match joined {
            Ok(result) => result,
            Err(e) => Err(GatewayError::internal(format!("bridge task failed: {e}"))),
        })
    }
}

/// Bounded pool executing blocking calls for async callers
#[derive(Debug)]
pub struct BlockingBridge {
    config: BridgeConfig,
    permits: Arc<Semaphore>,
}

impl BlockingBridge {
    /// Create a bridge
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        let workers = config.workers.max(1);
        Self {
            config: BridgeConfig { workers, ..config },
            permits: Arc::new(Semaphore::new(workers)),
        }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(BridgeConfig::default())
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Workers currently idle
    #[must_use]
    pub fn available_workers(&self) -> usize {
        self.permits.available_permits()
    }

    /// Whether `shutdown` has been called
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.permits.is_closed()
    }

    /// Reject new submissions; in-flight calls run to completion
    ///
    /// Calls still waiting for a worker fail with an internal error.
    pub fn shutdown(&self) {
        if !self.permits.is_closed() {
            self.permits.close();
            info!("Blocking bridge shut down");
        }
    }

    async fn acquire(permits: Arc<Semaphore>) -> GatewayResult<OwnedSemaphorePermit> {
        permits
            .acquire_owned()
            .await
            .map_err(|_| GatewayError::internal("blocking bridge is shut down"))
    }

    /// Submit a blocking call
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns `GatewayError::Internal` if the bridge has been shut down
    pub fn submit<T, F>(&self, call: F) -> GatewayResult<BridgeTask<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> GatewayResult<T> + Send + 'static,
    {
        if self.is_shutdown() {
            return Err(GatewayError::internal("blocking bridge is shut down"));
        }

        let permits = Arc::clone(&self.permits);
        let handle = tokio::spawn(async move {
            let permit = Self::acquire(permits).await?;
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                call()
            })
            .await
            .map_err(|e| {
                error!(error = %e, "Blocking worker failed");
                GatewayError::internal(format!("blocking worker failed: {e}"))
            })?
        });

        Ok(BridgeTask { handle })
    }

    /// Submit a blocking call that produces an iterator, and stream its items
    ///
    /// `open` and every `next()` run on a single worker, which is held until
    /// the iterator is exhausted, yields an error, or the stream is dropped.
    /// Items cross a bounded channel, so a slow consumer pauses the worker.
    ///
    /// # Errors
    /// Returns `GatewayError::Internal` if the bridge has been shut down
    pub fn submit_stream<T, I, F>(&self, open: F) -> GatewayResult<BoxStream<'static, GatewayResult<T>>>
    where
        T: Send + 'static,
        I: Iterator<Item = GatewayResult<T>>,
        F: FnOnce() -> GatewayResult<I> + Send + 'static,
    {
        if self.is_shutdown() {
            return Err(GatewayError::internal("blocking bridge is shut down"));
        }

        let (tx, mut rx) = mpsc::channel::<GatewayResult<T>>(self.config.stream_buffer.max(1));
        let permits = Arc::clone(&self.permits);

        tokio::spawn(async move {
            let permit = match Self::acquire(permits).await {
                Ok(permit) => permit,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };

            let worker_tx = tx.clone();
            let joined = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let items = match open() {
                    Ok(items) => items,
                    Err(e) => {
                        let _ = worker_tx.blocking_send(Err(e));
                        return;
                    }
                };

                let mut forwarded = 0_u64;
                for item in items {
                    let failed = item.is_err();
                    if worker_tx.blocking_send(item).is_err() {
                        debug!(forwarded, "Stream consumer went away, stopping worker");
                        return;
                    }
                    forwarded += 1;
                    if failed {
                        break;
                    }
                }
                debug!(forwarded, "Blocking stream finished");
            })
            .await;

            if let Err(e) = joined {
                error!(error = %e, "Blocking stream worker failed");
                let _ = tx
                    .send(Err(GatewayError::internal(format!(
                        "blocking worker failed: {e}"
                    ))))
                    .await;
            }
        });

        let items = stream! {
            while let Some(item) = rx.recv().await {
                let failed = item.is_err();
                yield item;
                if failed {
                    break;
                }
            }
        };

        Ok(Box::pin(items))
    }
}

impl Default for BlockingBridge {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_submit_returns_result() {
        let bridge = BlockingBridge::with_defaults();
        let task = bridge.submit(|| Ok(21 * 2)).expect("submit");
        assert_eq!(task.await.expect("result"), 42);
    }

    #[tokio::test]
    async fn test_submit_propagates_error() {
        let bridge = BlockingBridge::with_defaults();
        let task = bridge
            .submit::<(), _>(|| Err(GatewayError::provider("test", "boom", Some(500), false)))
            .expect("submit");
        assert!(matches!(task.await, Err(GatewayError::Provider { .. })));
    }

    #[tokio::test]
    async fn test_panicking_call_becomes_internal_error() {
        let bridge = BlockingBridge::with_defaults();
        let task = bridge
            .submit::<(), _>(|| panic!("worker exploded"))
            .expect("submit");
        assert!(matches!(task.await, Err(GatewayError::Internal { .. })));
        // Permit released after the panic
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(bridge.available_workers(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrency_is_bounded() {
        let bridge = BlockingBridge::new(BridgeConfig {
            workers: 2,
            ..BridgeConfig::default()
        });
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            tasks.push(
                bridge
                    .submit(move || {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(20));
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .expect("submit"),
            );
        }

        for task in tasks {
            task.await.expect("task");
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(bridge.available_workers(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_work() {
        let bridge = BlockingBridge::with_defaults();
        bridge.shutdown();
        bridge.shutdown();

        assert!(bridge.is_shutdown());
        assert!(matches!(
            bridge.submit(|| Ok(())),
            Err(GatewayError::Internal { .. })
        ));
        assert!(bridge
            .submit_stream(|| Ok(std::iter::empty::<GatewayResult<u8>>()))
            .is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropped_task_runs_to_completion() {
        let bridge = BlockingBridge::with_defaults();
        let finished = Arc::new(AtomicUsize::new(0));

        let flag = Arc::clone(&finished);
        let task = bridge
            .submit(move || {
                std::thread::sleep(Duration::from_millis(20));
                flag.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .expect("submit");
        drop(task);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stream_forwards_items_in_order() {
        let bridge = BlockingBridge::with_defaults();
        let stream = bridge
            .submit_stream(|| Ok((0..5).map(Ok)))
            .expect("submit");

        let items: Vec<u32> = stream
            .map(|item| item.expect("item"))
            .collect()
            .await;
        assert_eq!(items, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_stream_ends_after_error() {
        let bridge = BlockingBridge::with_defaults();
        let items = vec![
            Ok(1),
            Err(GatewayError::provider("test", "dropped", None, true)),
            Ok(2),
        ];
        let stream = bridge
            .submit_stream(move || Ok(items.into_iter()))
            .expect("submit");

        let collected: Vec<GatewayResult<u32>> = stream.collect().await;
        assert_eq!(collected.len(), 2);
        assert!(collected[0].is_ok());
        assert!(collected[1].is_err());
    }

    #[tokio::test]
    async fn test_stream_open_failure() {
        let bridge = BlockingBridge::with_defaults();
        let stream = bridge
            .submit_stream::<u8, std::iter::Empty<GatewayResult<u8>>, _>(|| {
                Err(GatewayError::provider("test", "refused", None, true))
            })
            .expect("submit");

        let collected: Vec<GatewayResult<u8>> = stream.collect().await;
        assert_eq!(collected.len(), 1);
        assert!(collected[0].as_ref().is_err_and(GatewayError::is_transient));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropped_stream_releases_worker() {
        let bridge = BlockingBridge::new(BridgeConfig {
            workers: 1,
            stream_buffer: 1,
        });
        let produced = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&produced);
        let mut stream = bridge
            .submit_stream(move || {
                Ok((0..).map(move |i: u64| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(i)
                }))
            })
            .expect("submit");

        assert_eq!(stream.next().await.expect("item").expect("ok"), 0);
        drop(stream);

        // The single worker is free again once the producer notices
        let task = bridge.submit(|| Ok("free")).expect("submit");
        assert_eq!(task.await.expect("result"), "free");
        assert!(produced.load(Ordering::SeqCst) < 10);
    }
}
