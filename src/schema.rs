//! Schema context and SQL dialect
//!
//! The schema context is an opaque text blob (tables, columns, sample rows)
//! handed unchanged to every generation and diagnosis call.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

const DEMO_SCHEMA: &str = include_str!("../schema/employee_sales.md");

/// Read-only schema description shared across attempts and concurrent runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaContext {
    text: Arc<str>,
}

impl SchemaContext {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Arc::from(text.into()),
        }
    }

    /// The bundled employee/sales description used by the demo database
    pub fn demo() -> Self {
        Self::new(DEMO_SCHEMA)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        if text.trim().is_empty() {
            return Err(PipelineError::Config(format!(
                "Schema file {} is empty",
                path.display()
            )));
        }
        Ok(Self::new(text))
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for SchemaContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Target SQL dialect, fixed per deployment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlDialect {
    #[default]
    MySql,
    PostgreSql,
    Sqlite,
    SqlServer,
    Other(String),
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlDialect::MySql => write!(f, "MySQL"),
            SqlDialect::PostgreSql => write!(f, "PostgreSQL"),
            SqlDialect::Sqlite => write!(f, "SQLite"),
            SqlDialect::SqlServer => write!(f, "SQL Server"),
            SqlDialect::Other(name) => write!(f, "{}", name),
        }
    }
}

impl FromStr for SqlDialect {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "" => Err(PipelineError::Config("SQL dialect must not be empty".to_string())),
            "mysql" | "mariadb" => Ok(SqlDialect::MySql),
            "postgres" | "postgresql" | "pg" => Ok(SqlDialect::PostgreSql),
            "sqlite" | "sqlite3" => Ok(SqlDialect::Sqlite),
            "sqlserver" | "mssql" | "tsql" => Ok(SqlDialect::SqlServer),
            _ => Ok(SqlDialect::Other(s.trim().to_string())),
        }
    }
}
