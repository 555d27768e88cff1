use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("invalid exemplar set: {0}")]
    InvalidSet(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("evaluation error: {0}")]
    Evaluation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
