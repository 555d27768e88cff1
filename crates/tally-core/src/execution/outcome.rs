use serde::{Deserialize, Serialize};
use std::fmt;

use crate::storage::{RowSet, StoreError};

/// Failure categories the repair loop distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Malformed or structurally invalid statement.
    Syntax,
    /// Reference to a table or column the schema lacks.
    UnknownIdentifier,
    /// Execution exceeded its time budget.
    Timeout,
    /// The store itself is unreachable.
    Connection,
    /// The execution task died, e.g. the store panicked.
    Internal,
}

impl FailureKind {
    /// Whether another generation attempt could fix this.
    pub fn is_recoverable(self) -> bool {
        !matches!(self, Self::Connection)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::UnknownIdentifier => "unknown_identifier",
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    pub kind: FailureKind,
    pub message: String,
    /// The unresolved name, for `UnknownIdentifier`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

impl ExecutionFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), identifier: None }
    }
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<StoreError> for ExecutionFailure {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Connection(message) => Self::new(FailureKind::Connection, message),
            StoreError::Syntax(message) | StoreError::Other(message) => Self::new(FailureKind::Syntax, message),
            StoreError::UnknownIdentifier { identifier, message } => {
                Self { kind: FailureKind::UnknownIdentifier, message, identifier: Some(identifier) }
            }
            StoreError::Interrupted => Self::new(FailureKind::Timeout, "query exceeded its time budget"),
        }
    }
}

/// Result of running one candidate query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success(RowSet),
    Failure(ExecutionFailure),
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn rows(&self) -> Option<&RowSet> {
        match self {
            Self::Success(rows) => Some(rows),
            Self::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ExecutionFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure),
        }
    }
}
