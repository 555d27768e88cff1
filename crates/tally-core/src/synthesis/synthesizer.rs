//! Deterministic answer synthesis from passages and query rows.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::citations::citations;
use super::evidence::{confidence, Evidence, EvidenceFlag};
use super::format::{cell_text, format_metric, truncate_at_sentence, FormatHint};
use crate::planning::{QueryPlan, SortOrder};
use crate::question::Question;
use crate::repair::{RepairState, RepairStatus};
use crate::retrieval::{tokenize, RetrievalResult};
use crate::routing::{RouteDecision, RouteMode};
use crate::storage::{RowSet, SchemaMetadata};

/// Explanation length cap, in characters.
pub const EXPLANATION_CHARS: usize = 250;

/// Grouped answers list at most this many entries in the sentence.
const LISTED_GROUPS: usize = 5;

/// The final, immutable answer to one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: String,
    pub text: String,
    /// `text` shaped to the question's format hint.
    pub final_answer: Value,
    pub confidence: f64,
    pub mode: RouteMode,
    pub explanation: String,
    pub citations: Vec<String>,
    /// The successful query, or the last one attempted.
    pub sql: Option<String>,
    pub evidence: Evidence,
}

/// Everything known about a question once retrieval and repair are done.
#[derive(Clone, Copy)]
pub struct SynthesisInput<'a> {
    pub question: &'a Question,
    pub route: &'a RouteDecision,
    pub retrieval: Option<&'a RetrievalResult>,
    pub plan: Option<&'a QueryPlan>,
    pub repair: Option<&'a RepairState>,
}

pub struct Synthesizer {
    schema: Arc<SchemaMetadata>,
}

impl Synthesizer {
    pub fn new(schema: Arc<SchemaMetadata>) -> Self {
        Self { schema }
    }

    pub fn synthesize(&self, input: SynthesisInput<'_>) -> Answer {
        let mode = input.route.mode;
        let hint = FormatHint::parse_lenient(input.question.format_hint());
        let mut evidence = gather_evidence(&input);

        let passage = input.retrieval.and_then(|r| best_sentence(input.question.text(), r));
        let rows = input.repair.and_then(RepairState::success).map(|(_, rows)| rows);

        let doc_part = passage.as_ref().map(|(id, sentence)| format!("Per {id}: {sentence}"));
        let query_part = match (input.repair, rows) {
            (_, Some(rows)) => Some(describe_rows(input.plan, rows)),
            (Some(state), None) => Some(exhausted_sentence(state)),
            (None, None) => None,
        };

        let mut parts: Vec<String> = Vec::new();
        match mode {
            RouteMode::Doc => {
                parts.push(doc_part.unwrap_or_else(|| "No relevant passage was found in the documents.".to_string()));
            }
            RouteMode::Sql => {
                parts.push(query_part.unwrap_or_else(|| "The database was not queried.".to_string()));
            }
            RouteMode::Hybrid => {
                if let Some(query_part) = query_part {
                    parts.push(query_part);
                }
                if let Some(doc_part) = doc_part {
                    parts.push(doc_part);
                }
                if rows.is_none() || passage.is_none() {
                    evidence.flag(EvidenceFlag::PartialAnswer);
                    parts.push(if rows.is_none() {
                        "Partial answer: only document evidence was available.".to_string()
                    } else {
                        "Partial answer: no supporting document passage was found.".to_string()
                    });
                }
            }
        }

        let disclosure = input.plan.and_then(QueryPlan::cost_approximation).map(|ratio| {
            format!(
                "Gross margin approximates cost of goods as {:.0}% of unit price.",
                ratio * 100.0
            )
        });
        if let Some(disclosure) = &disclosure {
            parts.push(disclosure.clone());
        }
        let text = parts.join(" ");

        let filled = match (&hint, rows) {
            (FormatHint::Str, _) => Some(Value::String(text.clone())),
            (_, Some(rows)) => hint.fill_rows(rows, &text),
            (_, None) => passage.as_ref().and_then(|(_, sentence)| hint.fill_text(sentence)),
        };
        let final_answer = filled.unwrap_or_else(|| {
            evidence.flag(EvidenceFlag::FormatUnfilled);
            hint.default_value()
        });

        let confidence = confidence(mode, &evidence);
        let sql = input.repair.and_then(RepairState::final_sql).map(str::to_string);
        let cited_sql = input.repair.and_then(RepairState::success).map(|(candidate, _)| candidate.sql.as_str());
        let citations = citations(cited_sql, evidence.doc_ids.iter().map(String::as_str), &self.schema);
        let explanation = explain(input.route, &evidence, disclosure.as_deref());

        debug!(
            question_id = input.question.id(),
            mode = %mode,
            confidence,
            flags = ?evidence.flags,
            "Synthesized answer"
        );

        Answer {
            question_id: input.question.id().to_string(),
            text,
            final_answer,
            confidence,
            mode,
            explanation,
            citations,
            sql,
            evidence,
        }
    }
}

fn gather_evidence(input: &SynthesisInput<'_>) -> Evidence {
    let mut evidence = Evidence::default();
    if input.route.is_ambiguous() {
        evidence.flag(EvidenceFlag::RoutingAmbiguous);
    }

    if let Some(retrieval) = input.retrieval {
        evidence.doc_ids = retrieval.doc_ids().into_iter().map(str::to_string).collect();
        evidence.top_score = retrieval.top_score();
    }
    if input.route.mode.needs_documents() && evidence.doc_ids.is_empty() {
        evidence.flag(EvidenceFlag::RetrievalEmpty);
    }

    if let Some(plan) = input.plan {
        if !plan.is_resolved() {
            evidence.flag(EvidenceFlag::UnresolvedMetric);
        }
        if plan.cost_approximation().is_some() {
            evidence.flag(EvidenceFlag::CostApproximated);
        }
    }

    if let Some(state) = input.repair {
        evidence.repair_status = Some(state.status());
        evidence.attempts = state.attempt_count();
        evidence.row_count = state.success().map_or(0, |(_, rows)| rows.len());
        evidence.last_failure = state.last_failure().map(ToString::to_string);
        if state.status() == RepairStatus::Exhausted {
            evidence.flag(EvidenceFlag::RepairExhausted);
        }
    }
    evidence
}

fn exhausted_sentence(state: &RepairState) -> String {
    let mut sentence = format!(
        "Could not complete the database query after {} attempt(s)",
        state.attempt_count()
    );
    if let Some(failure) = state.last_failure() {
        sentence.push_str(&format!(" (last error: {failure})"));
    }
    sentence.push('.');
    sentence
}

/// One sentence for a successful result set.
fn describe_rows(plan: Option<&QueryPlan>, rows: &RowSet) -> String {
    let scope = plan.map(QueryPlan::scope_description).filter(|s| !s.is_empty());
    let scope = scope.map_or_else(String::new, |s| format!(" for {s}"));

    if rows.is_empty() {
        return format!("The query returned no rows{scope}.");
    }

    let Some(metric) = plan.and_then(|p| p.metric) else {
        if let Some(cell) = rows.scalar() {
            return format!("Result: {}.", cell_text(cell));
        }
        let listed: Vec<String> = rows
            .rows
            .iter()
            .take(LISTED_GROUPS)
            .map(|row| row.iter().map(cell_text).collect::<Vec<_>>().join(" / "))
            .collect();
        return format!("The query returned {} row(s): {}.", rows.len(), listed.join("; "));
    };

    let value_of = |cell: Option<&Value>| cell.and_then(number).map(|v| format_metric(metric, v));
    let group_by = plan.and_then(|p| p.group_by);

    match group_by {
        None => match value_of(rows.scalar()) {
            Some(value) => format!("{}{scope}: {value}.", metric.label()),
            None => format!("No matching data for {}{scope}.", metric.label().to_lowercase()),
        },
        Some(dim) => {
            let entries: Vec<(String, String)> = rows
                .rows
                .iter()
                .map(|row| {
                    let name = row.first().map_or_else(|| "n/a".to_string(), cell_text);
                    let value = value_of(row.get(1)).unwrap_or_else(|| "n/a".to_string());
                    (name, value)
                })
                .collect();
            let adjective = match plan.map(|p| p.order).unwrap_or_default() {
                SortOrder::Desc => "Top",
                SortOrder::Asc => "Lowest",
            };
            let label = metric.label().to_lowercase();
            if entries.len() == 1 {
                let (name, value) = &entries[0];
                format!("{adjective} {dim} by {label}{scope}: {name} ({value}).")
            } else {
                let listed: Vec<String> =
                    entries.iter().take(LISTED_GROUPS).map(|(name, value)| format!("{name} ({value})")).collect();
                format!("{adjective} {} by {label}{scope}: {}.", dim.plural(), listed.join(", "))
            }
        }
    }
}

fn number(cell: &Value) -> Option<f64> {
    match cell {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// The passage sentence sharing the most terms with the question. Ties keep
/// the better-ranked passage; without any overlap the top passage's first
/// sentence is used.
fn best_sentence(question: &str, retrieval: &RetrievalResult) -> Option<(String, String)> {
    let terms: BTreeSet<String> = tokenize(question).into_iter().collect();
    let mut best: Option<(usize, &str, String)> = None;
    let mut fallback: Option<(&str, String)> = None;

    for passage in &retrieval.passages {
        for sentence in sentences(&passage.text) {
            if fallback.is_none() {
                fallback = Some((passage.id.as_str(), sentence.clone()));
            }
            let overlap = tokenize(&sentence).into_iter().collect::<BTreeSet<_>>().intersection(&terms).count();
            if overlap > 0 && best.as_ref().is_none_or(|(top, _, _)| overlap > *top) {
                best = Some((overlap, passage.id.as_str(), sentence));
            }
        }
    }

    best.map(|(_, id, sentence)| (id.to_string(), sentence))
        .or_else(|| fallback.map(|(id, sentence)| (id.to_string(), sentence)))
}

/// Sentences and list items of a markdown passage, without markup.
fn sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in text.lines() {
        let line = line.trim().trim_start_matches(['#', '-', '*', '>']).trim();
        if line.is_empty() {
            continue;
        }
        let mut start = 0;
        let chars: Vec<(usize, char)> = line.char_indices().collect();
        for (pos, (idx, c)) in chars.iter().enumerate() {
            let at_break = matches!(c, '.' | '!' | '?') && chars.get(pos + 1).is_none_or(|(_, next)| next.is_whitespace());
            if at_break {
                let end = idx + c.len_utf8();
                let sentence = line[start..end].trim();
                if !sentence.is_empty() {
                    out.push(sentence.to_string());
                }
                start = end;
            }
        }
        let rest = line[start..].trim();
        if !rest.is_empty() {
            out.push(rest.to_string());
        }
    }
    out
}

fn explain(route: &RouteDecision, evidence: &Evidence, disclosure: Option<&str>) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(disclosure) = disclosure {
        parts.push(disclosure.to_string());
    }
    parts.push(format!("Routed {}: {}.", route.mode, route.rationale.trim_end_matches('.')));

    match evidence.repair_status {
        Some(RepairStatus::Succeeded) => parts.push(format!(
            "Query succeeded on attempt {} with {} row(s).",
            evidence.attempts, evidence.row_count
        )),
        Some(RepairStatus::Exhausted) => {
            parts.push(format!("Query failed after {} attempt(s).", evidence.attempts));
        }
        _ => {}
    }
    if !evidence.doc_ids.is_empty() {
        parts.push(format!("Used {} passage(s), best {}.", evidence.doc_ids.len(), evidence.doc_ids[0]));
    } else if route.mode.needs_documents() {
        parts.push("No passage matched.".to_string());
    }
    truncate_at_sentence(&parts.join(" "), EXPLANATION_CHARS)
}
