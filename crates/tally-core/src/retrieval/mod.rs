//! Document corpus and passage retrieval.

pub mod document;
pub mod error;
pub mod index;

pub use document::{chunk_markdown, load_corpus, tokenize, Document, SNIPPET_CHARS};
pub use error::{CorpusError, CorpusResult};
pub use index::{RetrievalResult, Retriever, ScoredPassage};
