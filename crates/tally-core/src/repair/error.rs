use thiserror::Error;

use super::state::{RepairState, RepairStatus};
use crate::execution::ExecutionFailure;

/// Ways a repair run ends without a terminal [`RepairStatus`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepairError {
    /// The store is unreachable; retrying cannot help. `state` holds every
    /// attempt, the failed one included.
    #[error("Store connection failed: {}", failure.message)]
    Connection { failure: ExecutionFailure, state: Box<RepairState> },

    #[error("Repair cancelled")]
    Cancelled,

    #[error("Attempt {got} recorded out of order (expected {expected})")]
    OutOfOrder { expected: u32, got: u32 },

    #[error("Repair already finished ({0:?})")]
    Terminal(RepairStatus),
}

pub type RepairResult<T> = std::result::Result<T, RepairError>;
