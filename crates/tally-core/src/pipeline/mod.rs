//! Question-answering pipeline and its output records.

pub mod orchestrator;
pub mod record;

pub use orchestrator::{Pipeline, PipelineSettings};
pub use record::AnswerRecord;
