use super::signatures::REPAIR_SQL;
use super::{Agent, AgentReply, FixPlan, PromptInputs};
use crate::config::RateLimitPolicy;
use crate::error::Result;
use crate::llm::ReasoningBackend;
use std::sync::Arc;

/// Fix plan -> corrected SQL. Sees only the plan, never the failing SQL or error.
pub struct QueryRepairer {
    agent: Agent,
}

impl QueryRepairer {
    pub fn new(backend: Arc<dyn ReasoningBackend>, rate_limit: RateLimitPolicy) -> Self {
        Self {
            agent: Agent::new(&REPAIR_SQL, backend, rate_limit),
        }
    }

    pub async fn repair(&self, plan: &FixPlan) -> Result<AgentReply> {
        let inputs = PromptInputs::new().with("instruction", plan.text());
        self.agent.invoke(&inputs).await
    }
}
