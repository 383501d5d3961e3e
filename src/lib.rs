pub mod agents;
pub mod config;
pub mod db;
pub mod error;
pub mod execution;
pub mod execution_loop;
pub mod llm;
pub mod normalize;
pub mod observability;
pub mod schema;

pub use config::{AppConfig, DatabaseConfig, LlmConfig, PipelineConfig, RateLimitPolicy};
pub use error::{PipelineError, Result};
pub use execution::{CellValue, ExecutionError, QuerySession, SessionProvider, TabularResult};
pub use execution_loop::{RetryController, RunOutcome, RunRecord};
pub use llm::{LlmClient, ReasoningBackend};
pub use schema::{SchemaContext, SqlDialect};
