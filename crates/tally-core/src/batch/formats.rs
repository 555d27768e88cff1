//! Input format detection for batch files.

use crate::batch::error::{BatchError, BatchResult};

/// Supported batch input layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// One JSON object per line.
    JsonLines,
    /// A single JSON array of objects.
    JsonArray,
}

/// Detects the input format from file content.
///
/// # Errors
/// * `BatchError::InvalidInput` - If the content is empty
pub fn detect_format(content: &str) -> BatchResult<InputFormat> {
    let trimmed = content.trim_start();
    if trimmed.is_empty() {
        return Err(BatchError::InvalidInput("file is empty".to_string()));
    }
    if trimmed.starts_with('[') { Ok(InputFormat::JsonArray) } else { Ok(InputFormat::JsonLines) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_format_json_lines() {
        let content = "{\"id\": \"q1\", \"question\": \"a\"}\n{\"id\": \"q2\", \"question\": \"b\"}";
        assert_eq!(detect_format(content).unwrap(), InputFormat::JsonLines);
    }

    #[test]
    fn test_detect_format_json_array() {
        assert_eq!(detect_format("  [{\"question\": \"test\"}]").unwrap(), InputFormat::JsonArray);
    }

    #[test]
    fn test_detect_format_empty() {
        assert!(detect_format(" \n ").is_err());
    }
}
