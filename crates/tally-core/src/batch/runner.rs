//! Answers a batch of questions through a shared pipeline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::batch::error::BatchResult;
use crate::batch::input::BatchItem;
use crate::batch::processor::BatchProcessor;
use crate::batch::types::{BatchSummary, ProgressCallback};
use crate::pipeline::{AnswerRecord, Pipeline};

/// Every input position gets exactly one output record, in input order.
pub struct BatchRunner {
    pipeline: Arc<Pipeline>,
    processor: BatchProcessor,
    progress: Option<ProgressCallback>,
}

impl BatchRunner {
    /// # Errors
    /// * `BatchError::InvalidConfig` - If `concurrency` is zero
    pub fn new(pipeline: Arc<Pipeline>, concurrency: usize) -> BatchResult<Self> {
        Ok(Self { pipeline, processor: BatchProcessor::new(concurrency)?, progress: None })
    }

    #[must_use]
    pub fn with_item_timeout(mut self, limit: Duration) -> Self {
        self.processor = self.processor.with_item_timeout(limit);
        self
    }

    #[must_use]
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Answers `items`, returning the records and their summary.
    pub async fn run(&self, items: Vec<BatchItem>, cancel: &CancellationToken) -> (Vec<AnswerRecord>, BatchSummary) {
        let started = Instant::now();
        let labels: Vec<(String, Option<String>)> =
            items.iter().map(|item| (item.id().to_string(), item.format_hint().map(str::to_string))).collect();

        let pipeline = Arc::clone(&self.pipeline);
        let token = cancel.clone();
        let outcome = self
            .processor
            .process_batch(
                items,
                move |_, item| {
                    let pipeline = Arc::clone(&pipeline);
                    let token = token.clone();
                    async move {
                        let record = match item {
                            BatchItem::Question(question) => pipeline.answer_record(&question, &token).await,
                            BatchItem::Invalid { id, message, .. } => AnswerRecord::error(id, None, message),
                        };
                        Ok::<AnswerRecord, String>(record)
                    }
                },
                cancel,
                self.progress.clone(),
            )
            .await;

        let records: Vec<AnswerRecord> = outcome
            .outcomes
            .into_iter()
            .zip(labels)
            .map(|(result, (id, hint))| {
                result.unwrap_or_else(|failure| AnswerRecord::error(id, hint.as_deref(), failure.to_string()))
            })
            .collect();

        let summary = BatchSummary::from_records(&records, started.elapsed());
        info!(
            total = summary.total,
            answered = summary.answered,
            errors = summary.errors,
            mean_confidence = summary.mean_confidence,
            duration_ms = summary.duration_ms,
            "Batch finished"
        );
        (records, summary)
    }
}
