//! Offline selection of the exemplar set that maximises query validity.
//!
//! Validity is the fraction of validation questions whose generated query runs
//! without a structural error. The evaluator that measures it lives with the
//! generator; this module only orchestrates candidates and keeps the score sheet.

use crate::error::TrainingResult;
use crate::exemplars::{validate_set, Exemplar, ExemplarSet, ExemplarSetId, GenerationParams};
use crate::progress::{ProgressEvent, ProgressSink};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[async_trait]
pub trait ValidityEvaluator: Send + Sync {
    /// Fraction in `[0, 1]` of `validation` questions for which `set` yields an executable query.
    async fn validity(&self, set: &ExemplarSet, validation: &[Exemplar]) -> TrainingResult<f64>;

    /// Whether a reference query executes against the store.
    async fn query_is_valid(&self, sql: &str) -> TrainingResult<bool>;
}

#[derive(Debug, Clone, Default)]
pub struct OptimizerOptions {
    /// Cap on bootstrapped exemplars; `None` uses the baseline's `max_exemplars`.
    pub max_exemplars: Option<usize>,
    /// Alternative parameter sets tried alongside the baseline parameters.
    pub param_variants: Vec<GenerationParams>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub label: String,
    pub set_id: ExemplarSetId,
    pub validity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub baseline_id: ExemplarSetId,
    pub baseline_validity: f64,
    pub optimized_id: ExemplarSetId,
    pub optimized_validity: f64,
    pub kept_exemplars: usize,
    pub rejected_exemplars: usize,
    pub candidates: Vec<CandidateScore>,
}

impl OptimizationReport {
    pub fn improved(&self) -> bool {
        self.optimized_validity > self.baseline_validity
    }
}

pub struct Optimizer<'a, E: ValidityEvaluator> {
    evaluator: &'a E,
    progress: &'a dyn ProgressSink,
    options: OptimizerOptions,
}

impl<'a, E: ValidityEvaluator> Optimizer<'a, E> {
    pub fn new(evaluator: &'a E, progress: &'a dyn ProgressSink, options: OptimizerOptions) -> Self {
        Self { evaluator, progress, options }
    }

    /// Bootstraps exemplars from `train`, scores every candidate on `validation`
    /// and returns the best set. The baseline wins ties.
    pub async fn optimize(
        &self,
        baseline: &ExemplarSet,
        train: &[Exemplar],
        validation: &[Exemplar],
    ) -> TrainingResult<(ExemplarSet, OptimizationReport)> {
        validate_set(baseline)?;

        let (kept, rejected) = self.bootstrap(baseline, train).await?;
        self.progress.on_event(ProgressEvent::Message {
            message: format!("bootstrapped {} exemplars ({} rejected)", kept.len(), rejected),
        });

        let mut candidates = vec![("baseline".to_string(), baseline.clone())];
        if !kept.is_empty() {
            candidates.push((
                "bootstrapped".to_string(),
                ExemplarSet { exemplars: kept.clone(), ..baseline.clone() },
            ));
        }
        for (idx, params) in self.options.param_variants.iter().enumerate() {
            let exemplars = if kept.is_empty() { baseline.exemplars.clone() } else { kept.clone() };
            candidates.push((
                format!("variant-{idx}"),
                ExemplarSet { params: params.clone(), exemplars, ..baseline.clone() },
            ));
        }

        self.progress.on_event(ProgressEvent::Started { candidates: candidates.len() });

        let mut scores = Vec::with_capacity(candidates.len());
        let mut best: Option<(usize, f64)> = None;
        for (idx, (label, set)) in candidates.iter().enumerate() {
            let validity = self.evaluator.validity(set, validation).await?.clamp(0.0, 1.0);
            debug!(candidate = %label, validity, "scored exemplar set");
            self.progress.on_event(ProgressEvent::CandidateScored { label: label.clone(), validity });
            scores.push(CandidateScore { label: label.clone(), set_id: set.id()?, validity });

            if best.is_none_or(|(_, top)| validity > top) {
                best = Some((idx, validity));
            }
        }

        let (best_idx, best_validity) = best.unwrap_or((0, 0.0));
        let baseline_validity = scores.first().map_or(0.0, |s| s.validity);
        let mut optimized = candidates.swap_remove(best_idx).1;
        if best_idx != 0 {
            let id = optimized.id()?;
            optimized.version = format!("{}-opt-{}", baseline.version, id.short());
            optimized.description = format!("optimized from {} ({})", baseline.version, scores[best_idx].label);
        }

        self.progress.on_event(ProgressEvent::Finished {
            best: scores[best_idx].label.clone(),
            validity: best_validity,
        });

        let report = OptimizationReport {
            baseline_id: baseline.id()?,
            baseline_validity,
            optimized_id: optimized.id()?,
            optimized_validity: best_validity,
            kept_exemplars: kept.len(),
            rejected_exemplars: rejected,
            candidates: scores,
        };
        Ok((optimized, report))
    }

    async fn bootstrap(
        &self,
        baseline: &ExemplarSet,
        train: &[Exemplar],
    ) -> TrainingResult<(Vec<Exemplar>, usize)> {
        let cap = self.options.max_exemplars.unwrap_or(baseline.params.max_exemplars);
        let mut kept = Vec::new();
        let mut rejected = 0;

        for ex in train {
            if kept.len() >= cap {
                break;
            }
            if ex.sql.trim().is_empty() {
                rejected += 1;
                continue;
            }
            if self.evaluator.query_is_valid(&ex.sql).await? {
                kept.push(ex.clone());
            } else {
                rejected += 1;
            }
        }

        Ok((kept, rejected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::RecordingProgressSink;

    /// Scores a set by how many of its exemplars mention "valid".
    struct KeywordEvaluator;

    #[async_trait]
    impl ValidityEvaluator for KeywordEvaluator {
        async fn validity(&self, set: &ExemplarSet, _validation: &[Exemplar]) -> TrainingResult<f64> {
            if set.exemplars.is_empty() {
                return Ok(0.0);
            }
            let good = set.exemplars.iter().filter(|e| e.sql.contains("valid")).count();
            Ok(good as f64 / set.exemplars.len() as f64)
        }

        async fn query_is_valid(&self, sql: &str) -> TrainingResult<bool> {
            Ok(sql.contains("valid") && !sql.contains("invalid"))
        }
    }

    #[tokio::test]
    async fn test_bootstrap_keeps_only_valid_reference_queries() {
        let sink = RecordingProgressSink::default();
        let optimizer = Optimizer::new(&KeywordEvaluator, &sink, OptimizerOptions::default());
        let train = vec![
            Exemplar::new("a", "SELECT valid"),
            Exemplar::new("b", "SELECT invalid"),
            Exemplar::new("c", ""),
            Exemplar::new("d", "SELECT valid too"),
        ];

        let (set, report) =
            optimizer.optimize(&ExemplarSet::baseline(), &train, &[]).await.unwrap();

        assert_eq!(report.kept_exemplars, 2);
        assert_eq!(report.rejected_exemplars, 2);
        assert!(report.improved());
        assert_eq!(set.exemplars.len(), 2);
        assert!(set.version.starts_with("baseline-1-opt-"));
        assert!(matches!(sink.events().last(), Some(ProgressEvent::Finished { .. })));
    }

    #[tokio::test]
    async fn test_baseline_wins_ties() {
        struct Flat;

        #[async_trait]
        impl ValidityEvaluator for Flat {
            async fn validity(&self, _: &ExemplarSet, _: &[Exemplar]) -> TrainingResult<f64> {
                Ok(0.5)
            }
            async fn query_is_valid(&self, _: &str) -> TrainingResult<bool> {
                Ok(true)
            }
        }

        let sink = RecordingProgressSink::default();
        let options = OptimizerOptions {
            max_exemplars: Some(1),
            param_variants: vec![GenerationParams { default_top_n: 3, ..GenerationParams::default() }],
        };
        let optimizer = Optimizer::new(&Flat, &sink, options);
        let baseline = ExemplarSet::baseline();

        let (set, report) = optimizer
            .optimize(&baseline, &[Exemplar::new("q", "SELECT 1")], &[])
            .await
            .unwrap();

        assert_eq!(set, baseline);
        assert_eq!(report.candidates.len(), 3);
        assert!(!report.improved());
    }
}
