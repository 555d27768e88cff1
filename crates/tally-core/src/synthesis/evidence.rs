//! Evidence carried into an answer, and the confidence derived from it.
//!
//! [`confidence`] is a pure function of the route mode and the evidence, so
//! an answer's score can always be recomputed from its own record.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::format::round_to;
use crate::repair::RepairStatus;
use crate::routing::RouteMode;

/// Conditions that lowered confidence or shaped the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceFlag {
    RoutingAmbiguous,
    RetrievalEmpty,
    UnresolvedMetric,
    CostApproximated,
    RepairExhausted,
    PartialAnswer,
    FormatUnfilled,
}

impl EvidenceFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RoutingAmbiguous => "routing_ambiguous",
            Self::RetrievalEmpty => "retrieval_empty",
            Self::UnresolvedMetric => "unresolved_metric",
            Self::CostApproximated => "cost_approximated",
            Self::RepairExhausted => "repair_exhausted",
            Self::PartialAnswer => "partial_answer",
            Self::FormatUnfilled => "format_unfilled",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Passages consulted, best first.
    pub doc_ids: Vec<String>,
    pub top_score: f64,
    /// Terminal repair status, `None` when the database was not queried.
    pub repair_status: Option<RepairStatus>,
    pub attempts: u32,
    pub row_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<String>,
    pub flags: BTreeSet<EvidenceFlag>,
}

impl Evidence {
    pub fn has(&self, flag: EvidenceFlag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn flag(&mut self, flag: EvidenceFlag) {
        self.flags.insert(flag);
    }

    pub fn query_succeeded(&self) -> bool {
        self.repair_status == Some(RepairStatus::Succeeded)
    }

    /// One line for logs and the output record.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        if self.doc_ids.is_empty() {
            out.push_str("docs: none");
        } else {
            let _ = write!(out, "docs: {} (top {:.2})", self.doc_ids.join(", "), self.top_score);
        }
        match self.repair_status {
            Some(RepairStatus::Succeeded) => {
                let _ = write!(out, "; sql: succeeded in {} attempt(s), {} row(s)", self.attempts, self.row_count);
            }
            Some(RepairStatus::Exhausted) => {
                let _ = write!(out, "; sql: exhausted after {} attempt(s)", self.attempts);
            }
            Some(RepairStatus::Attempting) => out.push_str("; sql: incomplete"),
            None => out.push_str("; sql: not run"),
        }
        if !self.flags.is_empty() {
            let flags: Vec<&str> = self.flags.iter().map(|f| f.as_str()).collect();
            let _ = write!(out, "; flags: {}", flags.join(", "));
        }
        out
    }
}

/// Score of a route whose only evidence source produced nothing.
const NO_EVIDENCE: f64 = 0.1;

/// Lowest score of a successful query; stays above [`NO_EVIDENCE`] so a
/// success never ranks below an exhausted repair.
const SUCCESS_FLOOR: f64 = 0.15;

/// Document-side confidence, `None` without passages.
fn document_confidence(evidence: &Evidence) -> Option<f64> {
    let n = evidence.doc_ids.len();
    (n > 0).then(|| (0.3 + 0.5 * evidence.top_score.clamp(0.0, 1.0) + 0.05 * n.min(4) as f64).min(1.0))
}

/// Query-side confidence, `None` without a successful query.
fn query_confidence(evidence: &Evidence) -> Option<f64> {
    if !evidence.query_succeeded() {
        return None;
    }
    let mut score = 0.9 - 0.25 * f64::from(evidence.attempts.saturating_sub(1));
    if evidence.row_count == 0 {
        score -= 0.2;
    }
    if evidence.has(EvidenceFlag::UnresolvedMetric) {
        score -= 0.3;
    }
    if evidence.has(EvidenceFlag::CostApproximated) {
        score -= 0.05;
    }
    Some(score.clamp(SUCCESS_FLOOR, 1.0))
}

/// Confidence in `[0, 1]` from the route mode and evidence alone.
///
/// More or better evidence never lowers the score: a hybrid answer with both
/// sides scores at least as high as either side alone.
pub fn confidence(mode: RouteMode, evidence: &Evidence) -> f64 {
    let doc = document_confidence(evidence);
    let query = query_confidence(evidence);
    let mut score = match mode {
        RouteMode::Doc => doc.unwrap_or(NO_EVIDENCE),
        RouteMode::Sql => query.unwrap_or(NO_EVIDENCE),
        RouteMode::Hybrid => match (doc, query) {
            (Some(d), Some(q)) => (0.5 * d + 0.5 * q + 0.1).min(1.0),
            (Some(one), None) | (None, Some(one)) => one * 0.5,
            (None, None) => 0.05,
        },
    };
    if evidence.has(EvidenceFlag::FormatUnfilled) {
        score *= 0.8;
    }
    round_to(score.clamp(0.0, 1.0), 3)
}
