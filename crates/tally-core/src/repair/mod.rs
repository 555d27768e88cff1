//! Bounded retry of query generation with execution feedback.

pub mod error;
pub mod runner;
pub mod state;

pub use error::{RepairError, RepairResult};
pub use runner::RepairLoop;
pub use state::{AttemptRecord, RepairState, RepairStatus, DEFAULT_MAX_ATTEMPTS};
