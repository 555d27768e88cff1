//! Error types for Tally Core.

use tally_abstraction::ModelError;
use tally_training::TrainingError;
use thiserror::Error;

use crate::batch::BatchError;
use crate::config::ConfigError;
use crate::planning::PlanError;
use crate::repair::RepairError;
use crate::retrieval::CorpusError;
use crate::storage::StoreError;

/// Failures that end one question without an answer.
///
/// Everything else (ambiguous routing, empty retrieval, unresolved metric,
/// failed or exhausted repair) degrades the answer instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// The relational store is unreachable; not retried.
    #[error("Store connection error: {0}")]
    StoreConnection(String),

    #[error("Question processing was cancelled")]
    Cancelled,

    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// The repair loop's attempt bookkeeping was violated.
    #[error("Repair error: {0}")]
    Repair(RepairError),
}

impl From<RepairError> for PipelineError {
    fn from(err: RepairError) -> Self {
        match err {
            RepairError::Connection { failure, .. } => Self::StoreConnection(failure.message),
            RepairError::Cancelled => Self::Cancelled,
            other => Self::Repair(other),
        }
    }
}

/// Startup and batch-level errors.
#[derive(Error, Debug)]
pub enum TallyError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Corpus error: {0}")]
    Corpus(#[from] CorpusError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Exemplar set error: {0}")]
    Training(#[from] TrainingError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),
}

/// Result type alias for Tally startup operations.
pub type Result<T> = std::result::Result<T, TallyError>;
