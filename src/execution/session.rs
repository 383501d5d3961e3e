//! Execution boundary
//!
//! A run opens exactly one session and executes every candidate through it.
//! Implementations release their underlying connection when dropped, so a
//! session is given back on every exit path of a run.

use crate::execution::result::TabularResult;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ExecutionError {
    /// Raw message returned by the database engine
    #[error("{0}")]
    Engine(String),

    #[error("Empty SQL statement")]
    EmptyStatement,

    #[error("Query returned an empty result set.")]
    EmptyResult,

    #[error("Failed to decode column '{column}': {message}")]
    Decode { column: String, message: String },

    #[error("Session unavailable: {0}")]
    SessionUnavailable(String),
}

#[async_trait]
pub trait QuerySession: Send {
    async fn execute(&mut self, sql: &str) -> Result<TabularResult, ExecutionError>;
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn QuerySession>, ExecutionError>;
}
