//! Tally Training
//!
//! The versioned parameter set behind the query generator and the offline
//! tooling that produces it:
//! - Describing exemplar sets and their tunable parameters (`ExemplarSet`)
//! - Identifying a set by content hash (`ExemplarSetId`)
//! - Reading and writing sets and exemplar files
//! - Selecting the set that maximises query validity (`Optimizer`)

pub mod error;
pub mod exemplars;
pub mod optimizer;
pub mod progress;
pub mod store;

pub use error::{TrainingError, TrainingResult};
pub use exemplars::{compute_set_id, ident, validate_set, Exemplar, ExemplarSet, ExemplarSetId, GenerationParams};
pub use optimizer::{CandidateScore, OptimizationReport, Optimizer, OptimizerOptions, ValidityEvaluator};
pub use progress::{ProgressEvent, ProgressSink, RecordingProgressSink, TracingProgressSink};
pub use store::{read_exemplar_set, read_exemplars_jsonl, write_exemplar_set, write_exemplars_jsonl};
