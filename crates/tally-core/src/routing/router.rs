//! Keyword-cue question router.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::types::{RouteDecision, RouteMode};
use crate::question::Question;
use crate::text::{contains_phrase, words};

/// Metric and aggregation vocabulary.
pub const SQL_CUES: &[&str] = &[
    "revenue",
    "sales",
    "sold",
    "total",
    "sum",
    "average",
    "avg",
    "aov",
    "count",
    "how many",
    "number of",
    "top",
    "highest",
    "lowest",
    "most",
    "least",
    "best",
    "worst",
    "rank",
    "margin",
    "profit",
    "quantity",
    "units",
    "orders",
    "customers",
];

/// Definitional and policy vocabulary.
pub const DOC_CUES: &[&str] = &[
    "policy",
    "policies",
    "return window",
    "returns",
    "definition",
    "define",
    "defined",
    "meaning",
    "means",
    "explain",
    "according to",
    "per the",
    "kpi",
    "guideline",
    "guidelines",
    "rule",
    "rules",
    "calendar",
    "campaign",
    "what does",
    "handbook",
    "terms",
];

static YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("year regex should be valid"));

/// Classifies questions by which cue sets they hit.
///
/// Both sets, or neither, route to [`RouteMode::Hybrid`].
#[derive(Debug, Clone)]
pub struct Router {
    sql_cues: Vec<String>,
    doc_cues: Vec<String>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::with_cues(
            SQL_CUES.iter().map(|c| (*c).to_string()).collect(),
            DOC_CUES.iter().map(|c| (*c).to_string()).collect(),
        )
    }

    #[must_use]
    pub fn with_cues(sql_cues: Vec<String>, doc_cues: Vec<String>) -> Self {
        Self { sql_cues, doc_cues }
    }

    pub fn classify(&self, question: &Question) -> RouteDecision {
        let tokens = words(question.text());

        let mut sql_cues: Vec<String> =
            self.sql_cues.iter().filter(|cue| contains_phrase(&tokens, cue)).cloned().collect();
        if let Some(year) = YEAR.find(question.text()) {
            sql_cues.push(format!("year {}", year.as_str()));
        }
        let doc_cues: Vec<String> =
            self.doc_cues.iter().filter(|cue| contains_phrase(&tokens, cue)).cloned().collect();

        let (mode, rationale) = match (sql_cues.is_empty(), doc_cues.is_empty()) {
            (false, true) => (RouteMode::Sql, format!("metric cues: {}", sql_cues.join(", "))),
            (true, false) => (RouteMode::Doc, format!("document cues: {}", doc_cues.join(", "))),
            (false, false) => (
                RouteMode::Hybrid,
                format!("metric cues ({}) and document cues ({})", sql_cues.join(", "), doc_cues.join(", ")),
            ),
            (true, true) => (RouteMode::Hybrid, "no decisive cues; consulting both sources".to_string()),
        };

        debug!(
            question_id = %question.id(),
            mode = %mode,
            sql_cues = sql_cues.len(),
            doc_cues = doc_cues.len(),
            "Routed question"
        );

        RouteDecision { mode, rationale, sql_cues, doc_cues }
    }
}
