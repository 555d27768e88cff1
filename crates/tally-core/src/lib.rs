//! Tally Core - hybrid document and database question answering for retail
//! analytics.
//!
//! This crate provides:
//! - Routing questions to documents, the database, or both
//! - Passage retrieval over a markdown corpus
//! - Query planning, generation and bounded repair against SQLite
//! - Deterministic answer synthesis with citations and confidence
//! - A bounded-concurrency batch runner
//!
//! # Example
//!
//! ```rust,no_run
//! use tally_core::{config::{ConfigLayer, TallyConfig}, Pipeline, Question};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> tally_core::Result<()> {
//!     let config = TallyConfig::discover(&ConfigLayer::default())?;
//!     let pipeline = Pipeline::from_config(&config)?;
//!     let question = Question::new("q1", "Top 3 products by revenue in 1997");
//!     let record = pipeline.answer_record(&question, &CancellationToken::new()).await;
//!     println!("{}", record.answer);
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod execution;
pub mod generation;
pub mod pipeline;
pub mod planning;
pub mod question;
pub mod repair;
pub mod retrieval;
pub mod routing;
pub mod storage;
pub mod synthesis;
pub mod text;

pub use batch::{BatchError, BatchItem, BatchRunner, BatchSummary};
pub use config::{ConfigError, ConfigLayer, TallyConfig};
pub use error::{PipelineError, Result, TallyError};
pub use evaluation::ExecutionValidity;
pub use pipeline::{AnswerRecord, Pipeline, PipelineSettings};
pub use question::Question;
pub use routing::{RouteDecision, RouteMode, Router};
pub use synthesis::{Answer, Evidence, EvidenceFlag};
