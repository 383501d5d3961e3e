use super::signatures::GENERATE_SQL;
use super::{Agent, AgentReply, PromptInputs};
use crate::config::RateLimitPolicy;
use crate::error::{PipelineError, Result};
use crate::llm::ReasoningBackend;
use crate::schema::{SchemaContext, SqlDialect};
use std::sync::Arc;

/// Natural-language request -> candidate SQL
pub struct QueryGenerator {
    agent: Agent,
}

impl QueryGenerator {
    pub fn new(backend: Arc<dyn ReasoningBackend>, rate_limit: RateLimitPolicy) -> Self {
        Self {
            agent: Agent::new(&GENERATE_SQL, backend, rate_limit),
        }
    }

    /// A failed call or an empty reply is a generation failure
    pub async fn generate(
        &self,
        user_query: &str,
        schema: &SchemaContext,
        dialect: &SqlDialect,
    ) -> Result<AgentReply> {
        let inputs = PromptInputs::new()
            .with("user_query", user_query)
            .with("dataset_information", schema.as_str())
            .with("sql_dialect", dialect.to_string());

        let reply = self.agent.invoke(&inputs).await?;
        if reply.output.trim().is_empty() {
            return Err(PipelineError::EmptyResponse(self.agent.role().to_string()));
        }
        Ok(reply)
    }
}
