//! The bounded generate-then-execute loop.

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::{RepairError, RepairResult};
use super::state::{AttemptRecord, RepairState, RepairStatus};
use crate::execution::{Executor, FailureKind};
use crate::generation::{GenerationContext, QueryGenerator};

pub struct RepairLoop<'a> {
    generator: &'a QueryGenerator,
    executor: &'a Executor,
    max_attempts: u32,
}

impl<'a> RepairLoop<'a> {
    pub fn new(generator: &'a QueryGenerator, executor: &'a Executor, max_attempts: u32) -> Self {
        Self { generator, executor, max_attempts }
    }

    /// Runs until a success or until `max_attempts` executions have failed.
    ///
    /// A connection failure ends the run immediately, as does cancellation,
    /// which is checked before every attempt and raced against generation
    /// and execution.
    pub async fn run(&self, ctx: GenerationContext<'_>, cancel: &CancellationToken) -> RepairResult<RepairState> {
        let mut state = RepairState::new(self.max_attempts);
        let started = Instant::now();

        while state.status() == RepairStatus::Attempting {
            if cancel.is_cancelled() {
                return Err(RepairError::Cancelled);
            }

            let candidate = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(RepairError::Cancelled),
                candidate = self.generator.generate(ctx, state.attempts()) => candidate,
            };
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(RepairError::Cancelled),
                outcome = self.executor.execute(&candidate) => outcome,
            };

            let failure = outcome.failure().cloned();
            let attempt = candidate.attempt;
            state.record(AttemptRecord { candidate, outcome })?;

            if let Some(failure) = failure {
                if failure.kind == FailureKind::Connection {
                    warn!(
                        question_id = ctx.question.id(),
                        attempt,
                        error = %failure.message,
                        "Store unreachable, not retrying"
                    );
                    return Err(RepairError::Connection { failure, state: Box::new(state) });
                }
                debug!(
                    question_id = ctx.question.id(),
                    attempt,
                    failure_kind = %failure.kind,
                    error = %failure.message,
                    "Attempt failed"
                );
            }
        }

        info!(
            question_id = ctx.question.id(),
            status = ?state.status(),
            attempts = state.attempt_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Repair loop finished"
        );
        Ok(state)
    }
}
