//! Error types for the storage layer.

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::ErrorCode;
use thiserror::Error;

static NO_SUCH_IDENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)no such (?:column|table|function):\s*(.+?)(?:\s+-\s+should\b.*)?\s*$")
        .expect("unknown identifier regex should be valid")
});

static AMBIGUOUS_COLUMN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)ambiguous column name:\s*(.+?)\s*$").expect("ambiguous column regex should be valid")
});

/// Errors that can occur in the storage layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The database could not be opened or the connection broke.
    #[error("Database connection error: {0}")]
    Connection(String),

    /// The statement did not parse, or it would modify the database.
    #[error("Syntax error: {0}")]
    Syntax(String),

    /// The statement references a table or column the schema lacks.
    #[error("Unknown identifier '{identifier}': {message}")]
    UnknownIdentifier {
        /// The offending name as reported by the engine, qualifier stripped.
        identifier: String,
        message: String,
    },

    /// Execution exceeded its budget and was interrupted.
    #[error("Query interrupted after exceeding its time budget")]
    Interrupted,

    /// Any other engine failure.
    #[error("Query failed: {0}")]
    Other(String),
}

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StoreError>;

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        classify(&err)
    }
}

/// Maps an engine error onto the failure categories the repair loop understands.
pub fn classify(err: &rusqlite::Error) -> StoreError {
    let message = match err {
        rusqlite::Error::SqliteFailure(_, Some(msg)) => msg.clone(),
        other => other.to_string(),
    };

    if let rusqlite::Error::SqliteFailure(inner, _) = err {
        match inner.code {
            ErrorCode::OperationInterrupted => return StoreError::Interrupted,
            ErrorCode::CannotOpen
            | ErrorCode::NotADatabase
            | ErrorCode::PermissionDenied
            | ErrorCode::DatabaseCorrupt
            | ErrorCode::SystemIoFailure
            | ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked => return StoreError::Connection(message),
            ErrorCode::ReadOnly => return StoreError::Syntax(message),
            _ => {}
        }
    }

    if matches!(err, rusqlite::Error::MultipleStatement | rusqlite::Error::InvalidQuery) {
        return StoreError::Syntax(message);
    }

    classify_message(&message)
}

/// Classification by engine message text, for errors that carry no specific code.
pub fn classify_message(message: &str) -> StoreError {
    if let Some(caps) = NO_SUCH_IDENT.captures(message) {
        return StoreError::UnknownIdentifier {
            identifier: strip_qualifier(&caps[1]),
            message: message.to_string(),
        };
    }
    if let Some(caps) = AMBIGUOUS_COLUMN.captures(message) {
        return StoreError::UnknownIdentifier {
            identifier: strip_qualifier(&caps[1]),
            message: message.to_string(),
        };
    }
    if message.contains("interrupted") {
        return StoreError::Interrupted;
    }
    if message.contains("syntax error")
        || message.contains("incomplete input")
        || message.contains("unrecognized token")
        || message.contains("near \"")
    {
        return StoreError::Syntax(message.to_string());
    }
    StoreError::Other(message.to_string())
}

/// `od.Discnt` -> `Discnt`, `"Order Details"` -> `Order Details`.
fn strip_qualifier(raw: &str) -> String {
    let unquoted = raw.trim_matches(|c| c == '"' || c == '`' || c == '[' || c == ']');
    unquoted
        .rsplit_once('.')
        .map_or(unquoted, |(_, name)| name)
        .trim_matches(|c| c == '"' || c == '`' || c == '[' || c == ']')
        .to_string()
}
