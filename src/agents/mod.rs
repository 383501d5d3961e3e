//! Model-backed agents
//!
//! The three reasoning steps share one call path: an [`Agent`] renders a
//! [`Signature`] and its inputs into a chat request, sends it through the
//! [`ReasoningBackend`] with uniform rate-limit backoff, and pulls the output
//! field out of the reply.

pub mod diagnoser;
pub mod generator;
pub mod rate_limit;
pub mod repairer;
pub mod signatures;

pub use diagnoser::{Diagnosis, ErrorDiagnoser, FixPlan, NON_SQL_SENTINEL};
pub use generator::QueryGenerator;
pub use repairer::QueryRepairer;

use crate::config::RateLimitPolicy;
use crate::error::{PipelineError, Result};
use crate::llm::{AgentRole, ChatMessage, CompletionRequest, ReasoningBackend};
use crate::normalize::{strip_code_fences, strip_language_tag};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub description: &'static str,
}

/// Static description of one agent role
#[derive(Debug)]
pub struct Signature {
    pub role: AgentRole,
    pub instructions: &'static str,
    pub inputs: &'static [FieldSpec],
    pub output: FieldSpec,
    /// Ask the model to reason in a separate field before answering
    pub chain_of_thought: bool,
}

/// Named input values for one invocation
#[derive(Debug, Clone, Default)]
pub struct PromptInputs {
    fields: Vec<(&'static str, String)>,
}

impl PromptInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.fields.push((name, value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// What one agent call produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentReply {
    pub role: AgentRole,
    /// Raw model payload
    pub raw: String,
    /// Content of the signature's output field
    pub output: String,
    pub reasoning: Option<String>,
}

pub struct Agent {
    signature: &'static Signature,
    backend: Arc<dyn ReasoningBackend>,
    rate_limit: RateLimitPolicy,
}

impl Agent {
    pub fn new(
        signature: &'static Signature,
        backend: Arc<dyn ReasoningBackend>,
        rate_limit: RateLimitPolicy,
    ) -> Self {
        Self {
            signature,
            backend,
            rate_limit,
        }
    }

    pub fn role(&self) -> AgentRole {
        self.signature.role
    }

    /// Build the chat request for `inputs`; every declared input must be present
    pub fn render(&self, inputs: &PromptInputs) -> Result<CompletionRequest> {
        let sig = self.signature;

        let mut keys = Vec::new();
        if sig.chain_of_thought {
            keys.push("\"reasoning\" (think step by step before answering)".to_string());
        }
        keys.push(format!("\"{}\" ({})", sig.output.name, sig.output.description));

        let system = format!(
            "{}\n\nRespond with a single JSON object and nothing else. Keys: {}.",
            sig.instructions.trim(),
            keys.join(", ")
        );

        let mut sections = Vec::with_capacity(sig.inputs.len());
        for field in sig.inputs {
            let value = inputs.get(field.name).ok_or_else(|| {
                PipelineError::Config(format!(
                    "Missing input '{}' for {} agent",
                    field.name, sig.role
                ))
            })?;
            sections.push(format!("## {}\n{}\n\n{}", field.name, field.description, value));
        }

        Ok(CompletionRequest {
            role: sig.role,
            messages: vec![ChatMessage::system(system), ChatMessage::user(sections.join("\n\n"))],
        })
    }

    pub async fn invoke(&self, inputs: &PromptInputs) -> Result<AgentReply> {
        let request = self.render(inputs)?;
        let raw = rate_limit::complete_with_backoff(self.backend.as_ref(), &request, &self.rate_limit).await?;
        debug!(role = %self.signature.role, chars = raw.len(), "Agent replied");

        let (output, reasoning) = parse_reply(&raw, self.signature.output.name);
        Ok(AgentReply {
            role: self.signature.role,
            raw,
            output,
            reasoning,
        })
    }
}

/// Pull `field` (and an optional `reasoning`) out of a JSON reply.
/// Replies that are not JSON are taken verbatim as the output.
fn parse_reply(raw: &str, field: &str) -> (String, Option<String>) {
    let fenced = strip_language_tag(strip_code_fences(raw), "json");

    let parsed = [raw.trim(), fenced]
        .into_iter()
        .filter_map(json_object)
        .find(|map| map.get(field).map_or(false, |v| v.is_string()));

    if let Some(map) = parsed {
        let output = map.get(field).and_then(|v| v.as_str()).unwrap_or_default();
        let reasoning = map
            .get("reasoning")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        return (output.trim().to_string(), reasoning);
    }

    (raw.trim().to_string(), None)
}

/// The text as a JSON object, or the outermost `{...}` span inside it
fn json_object(text: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    let value = serde_json::from_str::<serde_json::Value>(text).ok().or_else(|| {
        let start = text.find('{')?;
        let end = text.rfind('}')?;
        (start < end)
            .then(|| serde_json::from_str::<serde_json::Value>(&text[start..=end]).ok())
            .flatten()
    })?;

    match value {
        serde_json::Value::Object(map) => Some(map),
        _ => None,
    }
}
