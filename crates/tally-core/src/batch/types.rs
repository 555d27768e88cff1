//! Data types for batch processing.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::AnswerRecord;

/// Why one item produced no result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemFailureKind {
    /// The item's own processing returned an error.
    Processing,
    /// The item exceeded its time limit.
    Timeout,
    /// The batch was cancelled before or during the item.
    Cancelled,
    /// The task running the item panicked or was aborted.
    Task,
}

impl fmt::Display for ItemFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Processing => "processing error",
            Self::Timeout => "timed out",
            Self::Cancelled => "cancelled",
            Self::Task => "task failed",
        };
        f.write_str(s)
    }
}

/// A failed item, by input position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub index: usize,
    pub kind: ItemFailureKind,
    pub message: String,
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item {} {}: {}", self.index, self.kind, self.message)
    }
}

/// Results of one batch, in input order.
#[derive(Debug)]
pub struct BatchOutcome<R> {
    /// One entry per input item; `outcomes[i]` belongs to item `i`.
    pub outcomes: Vec<Result<R, ItemFailure>>,
    pub total_duration: Duration,
}

impl<R> BatchOutcome<R> {
    pub fn total_items(&self) -> usize {
        self.outcomes.len()
    }

    pub fn successful(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.total_items() - self.successful()
    }

    /// Percentage of items that succeeded, `0.0` for an empty batch.
    pub fn success_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            0.0
        } else {
            self.successful() as f64 / self.total_items() as f64 * 100.0
        }
    }
}

/// Snapshot passed to the progress callback after each item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    /// The item that just finished.
    pub index: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

/// Progress callback function type.
pub type ProgressCallback = Arc<dyn Fn(BatchProgress) + Send + Sync>;

/// Totals over a finished batch of answer records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub answered: usize,
    pub errors: usize,
    /// Mean confidence over answered records.
    pub mean_confidence: f64,
    /// Answered records below the low-confidence threshold.
    pub low_confidence: usize,
    pub duration_ms: u64,
}

/// Answers scoring below this are counted as low confidence.
pub const LOW_CONFIDENCE: f64 = 0.3;

impl BatchSummary {
    pub fn from_records(records: &[AnswerRecord], duration: Duration) -> Self {
        let answered: Vec<&AnswerRecord> = records.iter().filter(|r| !r.is_error()).collect();
        let mean_confidence = if answered.is_empty() {
            0.0
        } else {
            answered.iter().map(|r| r.confidence).sum::<f64>() / answered.len() as f64
        };
        Self {
            total: records.len(),
            answered: answered.len(),
            errors: records.len() - answered.len(),
            mean_confidence,
            low_confidence: answered.iter().filter(|r| r.confidence < LOW_CONFIDENCE).count(),
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_counts() {
        let outcome: BatchOutcome<u32> = BatchOutcome {
            outcomes: vec![
                Ok(1),
                Err(ItemFailure { index: 1, kind: ItemFailureKind::Timeout, message: "slow".into() }),
                Ok(3),
                Ok(4),
            ],
            total_duration: Duration::from_millis(5),
        };
        assert_eq!(outcome.successful(), 3);
        assert_eq!(outcome.failed(), 1);
        assert!((outcome.success_rate() - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_ignores_error_records_in_mean() {
        let mut good = AnswerRecord::error("a", None, "x");
        good.error = None;
        good.confidence = 0.8;
        let mut weak = good.clone();
        weak.id = "b".into();
        weak.confidence = 0.2;
        let bad = AnswerRecord::error("c", None, "store down");

        let summary = BatchSummary::from_records(&[good, weak, bad], Duration::from_millis(12));
        assert_eq!(summary.total, 3);
        assert_eq!(summary.answered, 2);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.low_confidence, 1);
        assert!((summary.mean_confidence - 0.5).abs() < 1e-9);
    }
}
