//! The output record written for every input question.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PipelineError;
use crate::question::Question;
use crate::routing::RouteMode;
use crate::synthesis::{Answer, FormatHint};

/// One line of batch output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub id: String,
    pub final_answer: Value,
    pub answer: String,
    pub sql: String,
    pub confidence: f64,
    pub mode: RouteMode,
    pub explanation: String,
    pub citations: Vec<String>,
    pub evidence: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnswerRecord {
    pub fn from_answer(answer: Answer) -> Self {
        Self {
            id: answer.question_id,
            final_answer: answer.final_answer,
            answer: answer.text,
            sql: answer.sql.unwrap_or_default(),
            confidence: answer.confidence,
            mode: answer.mode,
            explanation: answer.explanation,
            citations: answer.citations,
            evidence: answer.evidence.summary(),
            error: None,
        }
    }

    /// Record for a question that ended in a fatal error.
    pub fn failed(question: &Question, error: &PipelineError) -> Self {
        Self::error(question.id(), question.format_hint(), error.to_string())
    }

    /// Record for an input line that never became a question, or a question
    /// whose processing failed outright.
    pub fn error(id: impl Into<String>, format_hint: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            id: id.into(),
            final_answer: FormatHint::parse_lenient(format_hint).default_value(),
            answer: String::new(),
            sql: String::new(),
            confidence: 0.0,
            mode: RouteMode::Hybrid,
            explanation: format!("Error: {message}"),
            citations: Vec::new(),
            evidence: "not answered".to_string(),
            error: Some(message),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failed_record_uses_hint_default() {
        let question = Question::new("q7", "Total revenue?").with_format_hint("float");
        let record = AnswerRecord::failed(&question, &PipelineError::StoreConnection("db gone".into()));

        assert_eq!(record.id, "q7");
        assert_eq!(record.final_answer, json!(0.0));
        assert!((record.confidence - 0.0).abs() < f64::EPSILON);
        assert_eq!(record.error.as_deref(), Some("Store connection error: db gone"));
        assert!(record.is_error());
    }

    #[test]
    fn test_error_field_omitted_when_absent() {
        let mut record = AnswerRecord::error("q1", Some("list[name:str]"), "boom");
        assert_eq!(record.final_answer, json!([]));
        record.error = None;
        let line = serde_json::to_string(&record).unwrap();
        assert!(!line.contains("\"error\""));
        assert!(line.contains("\"mode\":\"hybrid\""));
    }
}
