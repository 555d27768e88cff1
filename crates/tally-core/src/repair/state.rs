use serde::{Deserialize, Serialize};

use super::error::{RepairError, RepairResult};
use crate::execution::{ExecutionFailure, ExecutionOutcome};
use crate::generation::CandidateQuery;
use crate::storage::RowSet;

/// Default bound on generate-then-execute cycles per question.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStatus {
    Attempting,
    Succeeded,
    Exhausted,
}

/// One immutable generate-then-execute cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub candidate: CandidateQuery,
    pub outcome: ExecutionOutcome,
}

/// Attempt history of one question. Only grows, and only through [`RepairState::record`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairState {
    attempts: Vec<AttemptRecord>,
    max_attempts: u32,
    status: RepairStatus,
}

impl Default for RepairState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl RepairState {
    /// A fresh state. A bound of zero is raised to one.
    pub fn new(max_attempts: u32) -> Self {
        Self { attempts: Vec::new(), max_attempts: max_attempts.max(1), status: RepairStatus::Attempting }
    }

    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn status(&self) -> RepairStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status != RepairStatus::Attempting
    }

    /// Appends an attempt and advances the state machine.
    ///
    /// The candidate's attempt number must equal the number of attempts
    /// recorded so far, and nothing can be recorded once terminal.
    pub fn record(&mut self, record: AttemptRecord) -> RepairResult<RepairStatus> {
        if self.is_terminal() {
            return Err(RepairError::Terminal(self.status));
        }
        let expected = self.attempt_count();
        if record.candidate.attempt != expected {
            return Err(RepairError::OutOfOrder { expected, got: record.candidate.attempt });
        }

        let succeeded = record.outcome.is_success();
        self.attempts.push(record);
        self.status = if succeeded {
            RepairStatus::Succeeded
        } else if self.attempt_count() >= self.max_attempts {
            RepairStatus::Exhausted
        } else {
            RepairStatus::Attempting
        };
        Ok(self.status)
    }

    /// The successful candidate and its rows.
    pub fn success(&self) -> Option<(&CandidateQuery, &RowSet)> {
        self.attempts.iter().rev().find_map(|a| a.outcome.rows().map(|rows| (&a.candidate, rows)))
    }

    pub fn last_failure(&self) -> Option<&ExecutionFailure> {
        self.attempts.iter().rev().find_map(|a| a.outcome.failure())
    }

    /// SQL of the successful attempt, else of the last non-empty attempt.
    pub fn final_sql(&self) -> Option<&str> {
        if let Some((candidate, _)) = self.success() {
            return Some(candidate.sql.as_str());
        }
        self.attempts.iter().rev().map(|a| a.candidate.sql.as_str()).find(|sql| !sql.trim().is_empty())
    }
}
