//! Query-validity scoring for exemplar optimisation.

use std::sync::Arc;

use async_trait::async_trait;
use tally_training::{Exemplar, ExemplarSet, TrainingError, TrainingResult, ValidityEvaluator};
use tracing::debug;

use crate::execution::{ExecutionOutcome, Executor, FailureKind};
use crate::generation::{CandidateQuery, GenerationContext, QueryGenerator, Strategy};
use crate::pipeline::Pipeline;
use crate::planning::{PlanId, Planner};
use crate::question::Question;
use crate::routing::{RouteDecision, RouteMode};
use crate::storage::SchemaMetadata;

/// Scores an exemplar set by generating one query per validation question
/// and executing it against the live store.
///
/// A query is valid when it runs without a syntax or unknown-identifier
/// error; empty results and timeouts still count as valid.
pub struct ExecutionValidity<'a> {
    planner: &'a Planner,
    executor: &'a Executor,
    schema: &'a SchemaMetadata,
    generator_for: Box<dyn Fn(&ExemplarSet) -> QueryGenerator + Send + Sync + 'a>,
}

impl<'a> ExecutionValidity<'a> {
    pub fn new(pipeline: &'a Pipeline) -> Self {
        let model = pipeline.generator().model().cloned();
        Self {
            planner: pipeline.planner(),
            executor: pipeline.executor(),
            schema: pipeline.schema(),
            generator_for: Box::new(move |set: &ExemplarSet| {
                let generator = QueryGenerator::new(Arc::new(set.clone()));
                match &model {
                    Some(model) => generator.with_model(Arc::clone(model)),
                    None => generator,
                }
            }),
        }
    }

    /// `Ok(false)` for structural failures, an error when the store is gone.
    fn judge(outcome: &ExecutionOutcome) -> TrainingResult<bool> {
        match outcome.failure() {
            None => Ok(true),
            Some(f) if f.kind == FailureKind::Connection => Err(TrainingError::Evaluation(f.to_string())),
            Some(f) => Ok(f.kind == FailureKind::Timeout),
        }
    }
}

fn database_route() -> RouteDecision {
    RouteDecision {
        mode: RouteMode::Sql,
        rationale: "validation question".to_string(),
        sql_cues: Vec::new(),
        doc_cues: Vec::new(),
    }
}

#[async_trait]
impl ValidityEvaluator for ExecutionValidity<'_> {
    async fn validity(&self, set: &ExemplarSet, validation: &[Exemplar]) -> TrainingResult<f64> {
        if validation.is_empty() {
            return Ok(0.0);
        }

        let generator = (self.generator_for)(set);
        let route = database_route();
        let mut valid = 0usize;
        for (idx, exemplar) in validation.iter().enumerate() {
            let question = Question::new(format!("val_{idx}"), exemplar.question.clone());
            let plan = match self.planner.plan(&question, &route, None).await {
                Ok(plan) => plan,
                Err(e) => {
                    debug!(question = %exemplar.question, error = %e, "Validation question could not be planned");
                    continue;
                }
            };
            let ctx = GenerationContext {
                question: &question,
                plan: &plan,
                schema: self.schema,
                constraints: &exemplar.constraints,
            };
            let candidate = generator.generate(ctx, &[]).await;
            let outcome = self.executor.execute(&candidate).await;
            if Self::judge(&outcome)? {
                valid += 1;
            }
        }

        let score = valid as f64 / validation.len() as f64;
        debug!(version = %set.version, valid, total = validation.len(), score, "Measured exemplar set validity");
        Ok(score)
    }

    async fn query_is_valid(&self, sql: &str) -> TrainingResult<bool> {
        let candidate = CandidateQuery::new(sql, PlanId::new(), 0, Strategy::Template);
        Self::judge(&self.executor.execute(&candidate).await)
    }
}
