//! Core batch processor for parallel execution.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::batch::error::{BatchError, BatchResult};
use crate::batch::types::{BatchOutcome, BatchProgress, ItemFailure, ItemFailureKind, ProgressCallback};

/// Runs async work over a list of items with bounded concurrency.
///
/// Results come back in input order whatever order the items finish in.
#[derive(Debug, Clone)]
pub struct BatchProcessor {
    /// Maximum number of concurrent operations.
    concurrency: usize,
    /// Optional limit per item.
    item_timeout: Option<Duration>,
    /// Semaphore for concurrency control.
    semaphore: Arc<Semaphore>,
}

impl BatchProcessor {
    /// Create a new batch processor.
    ///
    /// # Errors
    /// * `BatchError::InvalidConfig` - If `concurrency` is zero
    pub fn new(concurrency: usize) -> BatchResult<Self> {
        if concurrency == 0 {
            return Err(BatchError::InvalidConfig("concurrency must be at least 1".to_string()));
        }
        Ok(Self { concurrency, item_timeout: None, semaphore: Arc::new(Semaphore::new(concurrency)) })
    }

    #[must_use]
    pub fn with_item_timeout(mut self, limit: Duration) -> Self {
        self.item_timeout = Some(limit);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Process a batch of items concurrently.
    ///
    /// `processor` receives each item with its input index. Cancelling
    /// `cancel` stops items that are still waiting for a permit and drops
    /// in-flight work; both are reported as [`ItemFailureKind::Cancelled`].
    pub async fn process_batch<T, R, F, Fut>(
        &self,
        items: Vec<T>,
        processor: F,
        cancel: &CancellationToken,
        progress_callback: Option<ProgressCallback>,
    ) -> BatchOutcome<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(usize, T) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<R, String>> + Send + 'static,
    {
        let start_time = Instant::now();
        let total = items.len();

        debug!(
            total_items = total,
            concurrency = self.concurrency,
            timeout_ms = self.item_timeout.map(|t| t.as_millis() as u64),
            "Starting batch processing"
        );

        let completed = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::with_capacity(total);

        for (index, item) in items.into_iter().enumerate() {
            let processor = processor.clone();
            let semaphore = Arc::clone(&self.semaphore);
            let item_timeout = self.item_timeout;
            let cancel = cancel.clone();
            let completed = Arc::clone(&completed);
            let failed = Arc::clone(&failed);
            let progress_callback = progress_callback.clone();

            let handle = tokio::spawn(async move {
                let outcome = run_item(index, item, processor, &semaphore, item_timeout, &cancel).await;

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                let failed_so_far = if outcome.is_err() {
                    failed.fetch_add(1, Ordering::SeqCst) + 1
                } else {
                    failed.load(Ordering::SeqCst)
                };
                if let Some(cb) = &progress_callback {
                    cb(BatchProgress { index, completed: done, failed: failed_so_far, total });
                }
                outcome
            });
            handles.push(handle);
        }

        // Handles are awaited in spawn order, so position equals input index.
        let mut outcomes = Vec::with_capacity(total);
        for (index, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!(index, error = %e, "Batch task join error");
                    outcomes.push(Err(ItemFailure { index, kind: ItemFailureKind::Task, message: e.to_string() }));
                }
            }
        }

        let outcome = BatchOutcome { outcomes, total_duration: start_time.elapsed() };
        debug!(
            total_items = total,
            successful = outcome.successful(),
            failed = outcome.failed(),
            duration_ms = outcome.total_duration.as_millis() as u64,
            "Batch processing completed"
        );
        outcome
    }
}

async fn run_item<T, R, F, Fut>(
    index: usize,
    item: T,
    processor: F,
    semaphore: &Semaphore,
    item_timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<R, ItemFailure>
where
    F: Fn(usize, T) -> Fut,
    Fut: Future<Output = Result<R, String>>,
{
    let failure = |kind, message: String| ItemFailure { index, kind, message };

    let _permit = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            return Err(failure(ItemFailureKind::Cancelled, "cancelled before start".to_string()));
        }
        permit = semaphore.acquire() => match permit {
            Ok(p) => p,
            Err(e) => return Err(failure(ItemFailureKind::Task, format!("semaphore error: {e}"))),
        },
    };

    let work = processor(index, item);
    let limited = async {
        match item_timeout {
            Some(limit) => timeout(limit, work).await.map_err(|_| limit),
            None => Ok(work.await),
        }
    };

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(failure(ItemFailureKind::Cancelled, "cancelled while running".to_string())),
        result = limited => match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(failure(ItemFailureKind::Processing, message)),
            Err(limit) => Err(failure(ItemFailureKind::Timeout, format!("timed out after {}ms", limit.as_millis()))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn mock_processor(_index: usize, item: usize) -> Result<String, String> {
        // Later items finish first.
        tokio::time::sleep(Duration::from_millis(5 * (10 - item as u64))).await;
        if item == 5 { Err("Simulated error".to_string()) } else { Ok(format!("result-{item}")) }
    }

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let processor = BatchProcessor::new(3).unwrap();
        let items: Vec<usize> = (0..10).collect();
        let result = processor.process_batch(items, mock_processor, &CancellationToken::new(), None).await;

        assert_eq!(result.total_items(), 10);
        assert_eq!(result.successful(), 9);
        for (i, outcome) in result.outcomes.iter().enumerate() {
            match outcome {
                Ok(value) => assert_eq!(value, &format!("result-{i}")),
                Err(failure) => {
                    assert_eq!(i, 5);
                    assert_eq!(failure.index, 5);
                    assert_eq!(failure.kind, ItemFailureKind::Processing);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let processor = BatchProcessor::new(2).unwrap();

        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));
        let result = processor
            .process_batch(
                (0..8).collect::<Vec<usize>>(),
                move |_, item| {
                    let (active, peak) = (Arc::clone(&a), Arc::clone(&p));
                    async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok::<usize, String>(item)
                    }
                },
                &CancellationToken::new(),
                None,
            )
            .await;

        assert_eq!(result.successful(), 8);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_item_timeout() {
        let processor = BatchProcessor::new(3).unwrap().with_item_timeout(Duration::from_millis(50));
        let result = processor
            .process_batch(
                vec![0usize, 1, 2],
                |_, item| async move {
                    if item == 0 {
                        tokio::time::sleep(Duration::from_millis(500)).await;
                    }
                    Ok::<usize, String>(item)
                },
                &CancellationToken::new(),
                None,
            )
            .await;

        assert!(matches!(&result.outcomes[0], Err(f) if f.kind == ItemFailureKind::Timeout));
        assert_eq!(result.successful(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_batch_reports_every_item() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let processor = BatchProcessor::new(2).unwrap();
        let result = processor
            .process_batch(vec![1usize, 2, 3], |_, item| async move { Ok::<usize, String>(item) }, &cancel, None)
            .await;

        assert_eq!(result.total_items(), 3);
        assert!(result.outcomes.iter().all(|o| matches!(o, Err(f) if f.kind == ItemFailureKind::Cancelled)));
    }

    #[tokio::test]
    async fn test_progress_callback_sees_every_item() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |progress: BatchProgress| {
            assert_eq!(progress.total, 4);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let processor = BatchProcessor::new(2).unwrap();
        processor
            .process_batch(
                vec![1usize, 2, 3, 4],
                |_, item| async move { Ok::<usize, String>(item) },
                &CancellationToken::new(),
                Some(callback),
            )
            .await;
        assert_eq!(seen.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        assert!(matches!(BatchProcessor::new(0), Err(BatchError::InvalidConfig(_))));
    }
}
