//! Candidate query execution.

pub mod executor;
pub mod outcome;

pub use executor::Executor;
pub use outcome::{ExecutionFailure, ExecutionOutcome, FailureKind};
