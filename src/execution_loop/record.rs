//! Run record
//!
//! Everything one request produced, in order: every model reply, every
//! executed candidate with its outcome, and the terminal state of the run.

use crate::agents::AgentReply;
use crate::error::{PipelineError, Result};
use crate::execution::TabularResult;
use crate::execution_loop::error_classifier::SqlErrorClass;
use crate::schema::SqlDialect;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Where a candidate statement came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateOrigin {
    Generated,
    Repaired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    ExecutionError,
    EmptyResult,
    /// Failed, and the diagnosis said the request was not a data query
    NonSqlIntent,
    /// The run deadline expired while this candidate was executing
    Interrupted,
}

/// One executed candidate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attempt {
    /// 0 for the generated statement, n for the n-th repair
    pub index: u32,
    pub origin: CandidateOrigin,
    pub sql: String,
    pub outcome: AttemptOutcome,
    pub error: Option<String>,
    pub error_class: Option<SqlErrorClass>,
    pub result: Option<TabularResult>,
    pub diagnosis: Option<String>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Session,
    Generation,
    Diagnosis,
    Repair,
    Deadline,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureStage::Session => "session",
            FailureStage::Generation => "generation",
            FailureStage::Diagnosis => "diagnosis",
            FailureStage::Repair => "repair",
            FailureStage::Deadline => "deadline",
        };
        write!(f, "{}", name)
    }
}

/// Terminal state of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Still executing; never observed on a returned record
    Pending,
    Success { attempt: u32 },
    /// The request was classified as non-SQL
    Aborted { attempt: u32 },
    /// Every repair cycle was spent without a success
    Exhausted {
        last_error: Option<String>,
        last_diagnosis: Option<String>,
    },
    Failed { stage: FailureStage, message: String },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success { .. })
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Pending => write!(f, "pending"),
            RunOutcome::Success { attempt } => write!(f, "success on attempt {}", attempt),
            RunOutcome::Aborted { attempt } => {
                write!(f, "aborted on attempt {}: not a data request", attempt)
            }
            RunOutcome::Exhausted { last_error, .. } => match last_error {
                Some(err) => write!(f, "retry budget exhausted (last error: {})", err),
                None => write!(f, "retry budget exhausted"),
            },
            RunOutcome::Failed { stage, message } => {
                write!(f, "failed during {}: {}", stage, message)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub user_query: String,
    pub dialect: SqlDialect,
    /// Generation and repair replies, in call order
    pub responses: Vec<AgentReply>,
    pub attempts: Vec<Attempt>,
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    pub fn new(user_query: impl Into<String>, dialect: SqlDialect) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            user_query: user_query.into(),
            dialect,
            responses: Vec::new(),
            attempts: Vec::new(),
            outcome: RunOutcome::Pending,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Executed statements, in execution order
    pub fn sql_candidates(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.sql.as_str()).collect()
    }

    /// Fix plans, in diagnosis order
    pub fn diagnoses(&self) -> Vec<&str> {
        self.attempts
            .iter()
            .filter_map(|a| a.diagnosis.as_deref())
            .collect()
    }

    /// Result tables returned by executions, in execution order
    pub fn result_tables(&self) -> Vec<&TabularResult> {
        self.attempts
            .iter()
            .filter_map(|a| a.result.as_ref())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// First successful statement and the first non-empty table
    pub fn answer(&self) -> Result<(&str, &TabularResult)> {
        let sql = self
            .attempts
            .iter()
            .find(|a| a.outcome == AttemptOutcome::Success)
            .map(|a| a.sql.as_str());
        let table = self.result_tables().into_iter().find(|t| !t.is_empty());

        match (sql, table) {
            (Some(sql), Some(table)) => Ok((sql, table)),
            _ => Err(PipelineError::NoAnswer(self.outcome.to_string())),
        }
    }

    pub(crate) fn finish(&mut self, outcome: RunOutcome) {
        self.outcome = outcome;
        self.finished_at = Some(Utc::now());
    }
}
