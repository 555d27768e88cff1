//! Reading question files and writing answer files.
//!
//! Questions are JSON objects `{id?, question, format_hint?}` (`text` is
//! accepted for `question`), either one per line or as a single array.
//! A record that cannot be read still occupies its position in the batch so
//! the output lines up with the input.

use std::io::Write as _;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::batch::error::{BatchError, BatchResult};
use crate::batch::formats::{detect_format, InputFormat};
use crate::pipeline::AnswerRecord;
use crate::question::Question;

/// One input position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchItem {
    Question(Question),
    /// A record that could not be turned into a question.
    Invalid { id: String, line: usize, message: String },
}

impl BatchItem {
    pub fn id(&self) -> &str {
        match self {
            Self::Question(q) => q.id(),
            Self::Invalid { id, .. } => id,
        }
    }

    pub fn format_hint(&self) -> Option<&str> {
        match self {
            Self::Question(q) => q.format_hint(),
            Self::Invalid { .. } => None,
        }
    }
}

#[derive(Deserialize)]
struct RawQuestion {
    #[serde(default)]
    id: Option<Value>,
    #[serde(alias = "text")]
    question: String,
    #[serde(default)]
    format_hint: Option<String>,
}

/// Id used when a record carries none; `position` is the 1-based record index.
fn fallback_id(position: usize) -> String {
    format!("q_{position}")
}

fn id_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Converts the record at 1-based `position`, read from physical `line`.
fn item_from_value(value: Value, position: usize, line: usize) -> BatchItem {
    let declared_id = id_text(value.get("id"));
    match serde_json::from_value::<RawQuestion>(value) {
        Ok(raw) if raw.question.trim().is_empty() => BatchItem::Invalid {
            id: id_text(raw.id.as_ref()).unwrap_or_else(|| fallback_id(position)),
            line,
            message: "question text is empty".to_string(),
        },
        Ok(raw) => {
            let id = id_text(raw.id.as_ref()).unwrap_or_else(|| fallback_id(position));
            let mut question = Question::new(id, raw.question.trim());
            if let Some(hint) = raw.format_hint {
                question = question.with_format_hint(hint);
            }
            BatchItem::Question(question)
        }
        Err(e) => BatchItem::Invalid {
            id: declared_id.unwrap_or_else(|| fallback_id(position)),
            line,
            message: format!("invalid question record: {e}"),
        },
    }
}

/// Parses batch input text.
///
/// Blank lines are skipped and do not count towards fallback ids.
///
/// # Errors
/// * `BatchError::InvalidInput` - If the content is empty or a JSON array
///   document is malformed
pub fn parse_questions(content: &str) -> BatchResult<Vec<BatchItem>> {
    let items = match detect_format(content)? {
        InputFormat::JsonArray => {
            let values: Vec<Value> = serde_json::from_str(content)
                .map_err(|e| BatchError::InvalidInput(format!("invalid JSON array: {e}")))?;
            values.into_iter().enumerate().map(|(idx, value)| item_from_value(value, idx + 1, idx + 1)).collect()
        }
        InputFormat::JsonLines => content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .enumerate()
            .map(|(pos, (idx, line))| match serde_json::from_str::<Value>(line) {
                Ok(value) => item_from_value(value, pos + 1, idx + 1),
                Err(e) => BatchItem::Invalid {
                    id: fallback_id(pos + 1),
                    line: idx + 1,
                    message: format!("malformed JSON: {e}"),
                },
            })
            .collect::<Vec<_>>(),
    };

    let invalid = items.iter().filter(|i| matches!(i, BatchItem::Invalid { .. })).count();
    if invalid > 0 {
        warn!(invalid, total = items.len(), "Some batch records could not be read");
    }
    debug!(total = items.len(), "Parsed batch input");
    Ok(items)
}

/// Reads and parses a batch input file.
///
/// # Errors
/// * `BatchError::Io` - If the file cannot be read
/// * `BatchError::InvalidInput` - See [`parse_questions`]
pub fn read_questions(path: &Path) -> BatchResult<Vec<BatchItem>> {
    let content = std::fs::read_to_string(path).map_err(|e| BatchError::io(path, e))?;
    parse_questions(&content)
}

/// Writes one JSON record per line, creating parent directories.
///
/// # Errors
/// * `BatchError::Io` - If the file cannot be written
/// * `BatchError::Serialize` - If a record cannot be serialized
pub fn write_records(path: &Path, records: &[AnswerRecord]) -> BatchResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| BatchError::io(parent, e))?;
    }

    let mut out = Vec::new();
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.push(b'\n');
    }
    let mut file = std::fs::File::create(path).map_err(|e| BatchError::io(path, e))?;
    file.write_all(&out).map_err(|e| BatchError::io(path, e))?;
    Ok(())
}

/// Reads records written by [`write_records`].
///
/// # Errors
/// * `BatchError::Io` - If the file cannot be read
/// * `BatchError::Serialize` - If a line is not a valid record
pub fn read_records(path: &Path) -> BatchResult<Vec<AnswerRecord>> {
    let content = std::fs::read_to_string(path).map_err(|e| BatchError::io(path, e))?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(BatchError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_json_lines() {
        let content = "{\"id\": \"rag_1\", \"question\": \"What is the return window?\", \"format_hint\": \"int\"}\n\
                       \n\
                       {\"text\": \"Total revenue in 1997?\"}\n";
        let items = parse_questions(content).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id(), "rag_1");
        assert_eq!(items[0].format_hint(), Some("int"));
        assert_eq!(items[1].id(), "q_2");
        match &items[1] {
            BatchItem::Question(q) => assert_eq!(q.text(), "Total revenue in 1997?"),
            other => panic!("expected a question, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_lines_keep_their_position() {
        let content = "{\"id\": \"a\", \"question\": \"one\"}\nnot json\n{\"id\": \"c\"}\n{\"id\": 4, \"question\": \"four\"}";
        let items = parse_questions(content).unwrap();

        assert_eq!(items.len(), 4);
        assert!(matches!(&items[1], BatchItem::Invalid { id, line: 2, .. } if id == "q_2"));
        assert!(matches!(&items[2], BatchItem::Invalid { id, .. } if id == "c"));
        assert_eq!(items[3].id(), "4");
    }

    #[test]
    fn test_blank_lines_do_not_shift_fallback_ids() {
        let content = "\n{\"question\": \"first\"}\n\n\nnot json\n  \n{\"question\": \"third\"}\n";
        let items = parse_questions(content).unwrap();

        let ids: Vec<&str> = items.iter().map(BatchItem::id).collect();
        assert_eq!(ids, ["q_1", "q_2", "q_3"]);
        assert!(matches!(&items[1], BatchItem::Invalid { line: 5, .. }));
    }

    #[test]
    fn test_parse_json_array() {
        let content = r#"[{"id": "x", "question": "Top 3 products by revenue"}, {"question": "   "}]"#;
        let items = parse_questions(content).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id(), "x");
        assert!(matches!(&items[1], BatchItem::Invalid { id, message, .. } if id == "q_2" && message.contains("empty")));
    }

    #[test]
    fn test_broken_array_is_an_error() {
        assert!(matches!(parse_questions("[{\"question\": "), Err(BatchError::InvalidInput(_))));
    }

    #[test]
    fn test_records_round_trip_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("answers.jsonl");
        let records = vec![AnswerRecord::error("q1", Some("int"), "boom"), AnswerRecord::error("q2", None, "bang")];

        write_records(&path, &records).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert_eq!(read_records(&path).unwrap(), records);
    }

    #[test]
    fn test_missing_input_file() {
        let err = read_questions(Path::new("/nonexistent/questions.jsonl")).unwrap_err();
        assert!(matches!(err, BatchError::Io { .. }));
    }
}
