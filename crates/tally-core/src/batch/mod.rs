//! Batch processing: question files in, answer records out, in input order.

pub mod error;
pub mod formats;
pub mod input;
pub mod processor;
pub mod runner;
pub mod types;

pub use error::{BatchError, BatchResult};
pub use formats::{detect_format, InputFormat};
pub use input::{parse_questions, read_questions, read_records, write_records, BatchItem};
pub use processor::BatchProcessor;
pub use runner::BatchRunner;
pub use types::{
    BatchOutcome, BatchProgress, BatchSummary, ItemFailure, ItemFailureKind, ProgressCallback, LOW_CONFIDENCE,
};
