//! Types for question routing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which evidence sources a question needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteMode {
    /// Documents only.
    Doc,
    /// Database only.
    Sql,
    /// Both documents and database.
    Hybrid,
}

impl RouteMode {
    pub fn needs_documents(self) -> bool {
        matches!(self, Self::Doc | Self::Hybrid)
    }

    pub fn needs_query(self) -> bool {
        matches!(self, Self::Sql | Self::Hybrid)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Doc => "doc",
            Self::Sql => "sql",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for RouteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "doc" | "rag" | "docs" => Ok(Self::Doc),
            "sql" => Ok(Self::Sql),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!("unknown route mode '{other}'")),
        }
    }
}

/// Outcome of routing one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub mode: RouteMode,
    pub rationale: String,
    /// Database-leaning cues that matched.
    pub sql_cues: Vec<String>,
    /// Document-leaning cues that matched.
    pub doc_cues: Vec<String>,
}

impl RouteDecision {
    /// No cue pointed either way and the mode is the hybrid default.
    pub fn is_ambiguous(&self) -> bool {
        self.sql_cues.is_empty() && self.doc_cues.is_empty()
    }
}
