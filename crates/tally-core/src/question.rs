use serde::{Deserialize, Serialize};

/// An incoming question. Fields are private so a question cannot change once
/// it has entered the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    id: String,
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    format_hint: Option<String>,
}

impl Question {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), format_hint: None }
    }

    #[must_use]
    pub fn with_format_hint(mut self, hint: impl Into<String>) -> Self {
        let hint = hint.into();
        self.format_hint = if hint.trim().is_empty() { None } else { Some(hint) };
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn format_hint(&self) -> Option<&str> {
        self.format_hint.as_deref()
    }
}
