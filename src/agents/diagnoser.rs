//! Error diagnosis
//!
//! The diagnoser's free-text plan is classified once, at this boundary: a plan
//! carrying [`NON_SQL_SENTINEL`] means the request was never a data query.

use super::signatures::DIAGNOSE_ERROR;
use super::{Agent, PromptInputs};
use crate::config::RateLimitPolicy;
use crate::error::{PipelineError, Result};
use crate::llm::ReasoningBackend;
use crate::schema::SchemaContext;
use serde::Serialize;
use std::sync::Arc;

/// Marker the diagnoser emits when the user did not ask for data
pub const NON_SQL_SENTINEL: &str = "NOT ASKING FOR SQL";

/// Diagnosis and remediation text, consumed verbatim by the repairer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FixPlan(String);

impl FixPlan {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn text(&self) -> &str {
        &self.0
    }

    pub fn is_non_sql_intent(&self) -> bool {
        self.0.contains(NON_SQL_SENTINEL)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnosis {
    Recoverable(FixPlan),
    NonSqlIntent(FixPlan),
}

impl Diagnosis {
    pub fn from_plan(plan: FixPlan) -> Self {
        if plan.is_non_sql_intent() {
            Diagnosis::NonSqlIntent(plan)
        } else {
            Diagnosis::Recoverable(plan)
        }
    }

    pub fn plan(&self) -> &FixPlan {
        match self {
            Diagnosis::Recoverable(plan) | Diagnosis::NonSqlIntent(plan) => plan,
        }
    }
}

/// Failed statement + engine error -> fix plan
pub struct ErrorDiagnoser {
    agent: Agent,
}

impl ErrorDiagnoser {
    pub fn new(backend: Arc<dyn ReasoningBackend>, rate_limit: RateLimitPolicy) -> Self {
        Self {
            agent: Agent::new(&DIAGNOSE_ERROR, backend, rate_limit),
        }
    }

    /// `hint` is the locally classified error category, if any
    pub async fn diagnose(
        &self,
        error_message: &str,
        incorrect_sql: &str,
        user_query: &str,
        schema: &SchemaContext,
        hint: Option<&str>,
    ) -> Result<Diagnosis> {
        let error_message = match hint {
            Some(hint) => format!("{}\n(classified as: {})", error_message, hint),
            None => error_message.to_string(),
        };
        let information = format!("User request: {}\n\n{}", user_query, schema.as_str());

        let inputs = PromptInputs::new()
            .with("error_message", error_message)
            .with("incorrect_sql", incorrect_sql)
            .with("information", information);

        let reply = self.agent.invoke(&inputs).await?;
        if reply.output.trim().is_empty() {
            return Err(PipelineError::MalformedFixPlan("diagnosis was empty".to_string()));
        }

        Ok(Diagnosis::from_plan(FixPlan::new(reply.output)))
    }
}
