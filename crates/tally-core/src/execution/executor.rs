//! Runs candidate queries on the blocking pool under a hard deadline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::spawn_blocking;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::outcome::{ExecutionFailure, ExecutionOutcome, FailureKind};
use crate::generation::CandidateQuery;
use crate::storage::RelationalStore;

/// Slack on top of the budget before the async side gives up on the blocking
/// task. The store interrupts itself at the budget, so this rarely triggers.
const DEADLINE_GRACE: Duration = Duration::from_millis(250);

#[derive(Clone)]
pub struct Executor {
    store: Arc<dyn RelationalStore>,
    budget: Duration,
}

impl Executor {
    pub fn new(store: Arc<dyn RelationalStore>, budget: Duration) -> Self {
        Self { store, budget }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn store(&self) -> &Arc<dyn RelationalStore> {
        &self.store
    }

    /// Executes `candidate`. Every failure, including a panic in the store,
    /// comes back as [`ExecutionOutcome::Failure`].
    pub async fn execute(&self, candidate: &CandidateQuery) -> ExecutionOutcome {
        let sql = candidate.sql.trim().to_string();
        if sql.is_empty() {
            let reason = candidate.note.clone().unwrap_or_else(|| "empty query".to_string());
            return ExecutionOutcome::Failure(ExecutionFailure::new(
                FailureKind::Syntax,
                format!("no query to execute: {reason}"),
            ));
        }

        let store = Arc::clone(&self.store);
        let budget = self.budget;
        let started = Instant::now();
        let task = spawn_blocking(move || store.execute(&sql, budget));

        let outcome = match timeout(budget + DEADLINE_GRACE, task).await {
            Ok(Ok(Ok(rows))) => ExecutionOutcome::Success(rows),
            Ok(Ok(Err(err))) => ExecutionOutcome::Failure(err.into()),
            Ok(Err(join_err)) => {
                warn!(error = %join_err, "Execution task failed");
                ExecutionOutcome::Failure(ExecutionFailure::new(
                    FailureKind::Internal,
                    format!("execution task failed: {join_err}"),
                ))
            }
            Err(_) => ExecutionOutcome::Failure(ExecutionFailure::new(
                FailureKind::Timeout,
                format!("query exceeded its {} ms budget", budget.as_millis()),
            )),
        };

        debug!(
            plan_id = %candidate.plan_id,
            attempt = candidate.attempt,
            success = outcome.is_success(),
            failure_kind = ?outcome.failure().map(|f| f.kind),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Executed candidate query"
        );
        outcome
    }
}
