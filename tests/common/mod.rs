#![allow(dead_code)]

use async_trait::async_trait;
use querysmith::config::{PipelineConfig, RateLimitPolicy};
use querysmith::execution::{CellValue, ExecutionError, QuerySession, SessionProvider, TabularResult};
use querysmith::llm::{AgentRole, CompletionRequest, LlmError, ReasoningBackend};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Backend that answers each role from its own queue, in order
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<HashMap<AgentRole, VecDeque<Result<String, LlmError>>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    delays: Mutex<HashMap<AgentRole, Duration>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, role: AgentRole, raw: impl Into<String>) -> Self {
        self.push(role, Ok(raw.into()))
    }

    pub fn fail(self, role: AgentRole, err: LlmError) -> Self {
        self.push(role, Err(err))
    }

    /// Every call for `role` waits `delay` before answering
    pub fn slow(self, role: AgentRole, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(role, delay);
        self
    }

    fn push(self, role: AgentRole, entry: Result<String, LlmError>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(role)
            .or_default()
            .push_back(entry);
        self
    }

    pub fn calls(&self, role: AgentRole) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.role == role)
            .count()
    }

    pub fn requests(&self, role: AgentRole) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.role == role)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ReasoningBackend for ScriptedBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let delay = self.delays.lock().unwrap().get(&request.role).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.scripts
            .lock()
            .unwrap()
            .get_mut(&request.role)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| Err(LlmError::Transport(format!("no scripted reply for {}", request.role))))
    }
}

pub fn sql_reply(sql: &str) -> String {
    serde_json::json!({ "generated_sql": sql }).to_string()
}

pub fn repair_reply(reasoning: &str, sql: &str) -> String {
    serde_json::json!({ "reasoning": reasoning, "generated_sql": sql }).to_string()
}

pub fn plan_reply(plan: &str) -> String {
    serde_json::json!({ "error_fix_reasoning": plan }).to_string()
}

/// In-memory database: statements map to fixed results, anything else is an engine error
#[derive(Default)]
pub struct FakeDatabase {
    responses: Arc<HashMap<String, Result<TabularResult, ExecutionError>>>,
    executed: Arc<Mutex<Vec<String>>>,
    opened: AtomicUsize,
    released: Arc<AtomicUsize>,
    unavailable: bool,
    delay: Option<Duration>,
}

impl FakeDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sql: &str, response: Result<TabularResult, ExecutionError>) -> Self {
        Arc::make_mut(&mut self.responses).insert(sql.to_string(), response);
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionProvider for FakeDatabase {
    async fn open_session(&self) -> Result<Box<dyn QuerySession>, ExecutionError> {
        if self.unavailable {
            return Err(ExecutionError::SessionUnavailable("pool timed out".to_string()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            responses: Arc::clone(&self.responses),
            executed: Arc::clone(&self.executed),
            released: Arc::clone(&self.released),
            delay: self.delay,
        }))
    }
}

struct FakeSession {
    responses: Arc<HashMap<String, Result<TabularResult, ExecutionError>>>,
    executed: Arc<Mutex<Vec<String>>>,
    released: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl QuerySession for FakeSession {
    async fn execute(&mut self, sql: &str) -> Result<TabularResult, ExecutionError> {
        if sql.trim().is_empty() {
            return Err(ExecutionError::EmptyStatement);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.executed.lock().unwrap().push(sql.to_string());
        self.responses
            .get(sql)
            .cloned()
            .unwrap_or_else(|| Err(ExecutionError::Engine(format!("no such table: {}", first_table(sql)))))
    }
}

fn first_table(sql: &str) -> String {
    sql.split_whitespace()
        .skip_while(|w| !w.eq_ignore_ascii_case("from"))
        .nth(1)
        .unwrap_or("unknown")
        .to_string()
}

pub fn units_by_employee() -> TabularResult {
    TabularResult::new(
        vec!["full_name".to_string(), "total_units".to_string()],
        vec![
            vec![CellValue::Text("Jane Smith".to_string()), CellValue::Float(550.0)],
            vec![CellValue::Text("John Doe".to_string()), CellValue::Float(250.0)],
        ],
    )
}

pub fn empty_table() -> TabularResult {
    TabularResult::new(vec!["greeting".to_string()], vec![])
}

/// Pipeline config with a fast rate-limit policy
pub fn pipeline(max_retry: u32) -> PipelineConfig {
    PipelineConfig {
        max_retry,
        rate_limit: RateLimitPolicy {
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            multiplier: 2.0,
            randomization_factor: 0.0,
            max_retries: 3,
            max_elapsed: Duration::from_secs(2),
        },
        ..PipelineConfig::default()
    }
}
