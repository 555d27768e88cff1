use thiserror::Error;

#[derive(Error, Debug)]
pub enum CorpusError {
    /// The corpus directory does not exist.
    #[error("Document corpus not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CorpusResult<T> = std::result::Result<T, CorpusError>;
