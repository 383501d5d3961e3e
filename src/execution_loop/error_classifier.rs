//! Error Classifier
//!
//! Classifies raw engine errors into the diagnosis taxonomy. The class is
//! recorded on the attempt, logged, and passed to the diagnoser as a hint.

use crate::execution::ExecutionError;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

lazy_static! {
    static ref MISSING_COLUMN: Regex = Regex::new(
        r#"(?i)unknown column '([^']+)'|column "([^"]+)" does not exist|no such column: ([\w.]+)|column '?([\w.]+)'? not found"#
    )
    .expect("valid column regex");
    static ref MISSING_TABLE: Regex = Regex::new(
        r#"(?i)table '([^']+)' doesn't exist|relation "([^"]+)" does not exist|no such table: ([\w.]+)|table '?([\w.]+)'? not found"#
    )
    .expect("valid table regex");
}

/// SQL error classification taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "class", content = "identifier", rename_all = "snake_case")]
pub enum SqlErrorClass {
    ColumnNotFound(Option<String>),
    TableNotFound(Option<String>),
    AmbiguousColumn,
    SyntaxError,
    DatatypeMismatch,
    MissingClause,
    UnsafeStatement,
    EmptyResult,
    EmptyStatement,
    Other,
}

impl fmt::Display for SqlErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlErrorClass::ColumnNotFound(Some(name)) => write!(f, "missing or incorrect column `{}`", name),
            SqlErrorClass::ColumnNotFound(None) => write!(f, "missing or incorrect column"),
            SqlErrorClass::TableNotFound(Some(name)) => write!(f, "missing or incorrect table `{}`", name),
            SqlErrorClass::TableNotFound(None) => write!(f, "missing or incorrect table"),
            SqlErrorClass::AmbiguousColumn => write!(f, "ambiguous column reference"),
            SqlErrorClass::SyntaxError => write!(f, "syntax error"),
            SqlErrorClass::DatatypeMismatch => write!(f, "datatype mismatch"),
            SqlErrorClass::MissingClause => write!(f, "missing required clause"),
            SqlErrorClass::UnsafeStatement => write!(f, "unsafe statement"),
            SqlErrorClass::EmptyResult => write!(f, "empty result set"),
            SqlErrorClass::EmptyStatement => write!(f, "empty statement"),
            SqlErrorClass::Other => write!(f, "unclassified"),
        }
    }
}

/// Error classifier
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify an execution failure into the taxonomy
    pub fn classify(&self, error: &ExecutionError) -> SqlErrorClass {
        match error {
            ExecutionError::EmptyResult => SqlErrorClass::EmptyResult,
            ExecutionError::EmptyStatement => SqlErrorClass::EmptyStatement,
            ExecutionError::Decode { .. } | ExecutionError::SessionUnavailable(_) => SqlErrorClass::Other,
            ExecutionError::Engine(message) => self.classify_message(message),
        }
    }

    /// Pattern matching on MySQL, PostgreSQL and SQLite error messages
    pub fn classify_message(&self, message: &str) -> SqlErrorClass {
        if let Some(caps) = MISSING_COLUMN.captures(message) {
            return SqlErrorClass::ColumnNotFound(first_group(&caps));
        }
        if let Some(caps) = MISSING_TABLE.captures(message) {
            return SqlErrorClass::TableNotFound(first_group(&caps));
        }

        let msg = message.to_lowercase();

        if msg.contains("ambiguous") {
            return SqlErrorClass::AmbiguousColumn;
        }

        if msg.contains("group by") || msg.contains("aggregate function") || msg.contains("missing from-clause") {
            return SqlErrorClass::MissingClause;
        }

        if msg.contains("datatype mismatch")
            || msg.contains("operator does not exist")
            || msg.contains("invalid input syntax for type")
            || msg.contains("incorrect integer value")
            || msg.contains("incorrect decimal value")
            || msg.contains("truncated incorrect")
            || msg.contains("cannot cast")
        {
            return SqlErrorClass::DatatypeMismatch;
        }

        if msg.contains("syntax") || msg.contains("incomplete input") || msg.contains("unrecognized token") {
            return SqlErrorClass::SyntaxError;
        }

        if msg.contains("multiple statements")
            || msg.contains("permission denied")
            || msg.contains("command denied")
            || msg.contains("readonly")
            || msg.contains("read-only")
        {
            return SqlErrorClass::UnsafeStatement;
        }

        if msg.contains("column") && (msg.contains("not found") || msg.contains("does not exist")) {
            return SqlErrorClass::ColumnNotFound(None);
        }

        if msg.contains("table") && (msg.contains("not found") || msg.contains("does not exist")) {
            return SqlErrorClass::TableNotFound(None);
        }

        SqlErrorClass::Other
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn first_group(caps: &regex::Captures<'_>) -> Option<String> {
    caps.iter().skip(1).flatten().next().map(|m| m.as_str().to_string())
}
