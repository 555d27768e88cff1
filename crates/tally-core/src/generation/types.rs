use serde::{Deserialize, Serialize};

use crate::planning::PlanId;

/// How a candidate query was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Deterministic template for a resolved plan.
    Template,
    /// Template regenerated with identifiers remapped after an unknown-identifier failure.
    CorrectedTemplate,
    /// Previous query text with an unknown identifier substituted.
    IdentifierSubstitution,
    /// Written by the language model.
    ModelAssisted,
    /// Nothing usable was produced; the text is empty.
    Unavailable,
}

/// One query attempt. `attempt` starts at 0 for the first candidate of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateQuery {
    pub sql: String,
    pub plan_id: PlanId,
    pub attempt: u32,
    pub strategy: Strategy,
    /// Why no query could be produced, for `Strategy::Unavailable`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl CandidateQuery {
    pub fn new(sql: impl Into<String>, plan_id: PlanId, attempt: u32, strategy: Strategy) -> Self {
        Self { sql: sql.into(), plan_id, attempt, strategy, note: None }
    }

    pub fn unavailable(plan_id: PlanId, attempt: u32, note: impl Into<String>) -> Self {
        Self { sql: String::new(), plan_id, attempt, strategy: Strategy::Unavailable, note: Some(note.into()) }
    }
}
