//! Runtime configuration
//!
//! Everything the pipeline needs is gathered into explicit structs that are
//! threaded into the controller at construction. `AppConfig::from_env` reads
//! the process environment (after `dotenv`), the CLI layers overrides on top.

use crate::error::{PipelineError, Result};
use crate::llm::DEFAULT_REQUEST_TIMEOUT;
use crate::schema::SqlDialect;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
    pub log_file: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database: DatabaseConfig::from_env()?,
            llm: LlmConfig::from_env()?,
            pipeline: PipelineConfig::from_env()?,
            log_file: log_file_from_env(),
        })
    }
}

/// `LOG_FILE`, defaulting to `./application.log`; an empty value disables the file log
pub fn log_file_from_env() -> Option<PathBuf> {
    match std::env::var("LOG_FILE") {
        Ok(v) if v.trim().is_empty() => None,
        Ok(v) => Some(PathBuf::from(v)),
        Err(_) => Some(PathBuf::from("./application.log")),
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self> {
        let url = match std::env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => url,
            _ => mysql_url(
                &env_or("mysql_host", "localhost"),
                env_parse("mysql_port", 3306u16)?,
                &env_or("mysql_user", "root"),
                &env_or("mysql_password", ""),
                &env_or("mysql_database", "chatbot"),
            )?,
        };

        Ok(Self {
            url,
            max_connections: env_parse("DB_MAX_CONNECTIONS", 10)?,
            acquire_timeout: Duration::from_secs(env_parse("DB_ACQUIRE_TIMEOUT_SECS", 30)?),
        })
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// Compose a MySQL connection URL from its parts; credentials are percent-encoded
pub fn mysql_url(host: &str, port: u16, user: &str, password: &str, database: &str) -> Result<String> {
    let invalid = |what: &str| PipelineError::Config(format!("Invalid MySQL {} for host '{}'", what, host));

    let mut url = Url::parse(&format!("mysql://{}:{}", host, port)).map_err(|_| invalid("host"))?;
    url.set_username(user).map_err(|_| invalid("user"))?;
    if !password.is_empty() {
        url.set_password(Some(password)).map_err(|_| invalid("password"))?;
    }
    url.set_path(database);

    Ok(url.to_string())
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout: Duration,
}

impl LlmConfig {
    pub fn from_env() -> Result<Self> {
        let api_key = ["LLM_API_KEY", "GROQ_API_KEY", "OPENAI_API_KEY"]
            .iter()
            .find_map(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| {
                PipelineError::Config(
                    "No model API key found (set LLM_API_KEY, GROQ_API_KEY or OPENAI_API_KEY)".to_string(),
                )
            })?;

        Ok(Self {
            api_key,
            base_url: env_or("LLM_BASE_URL", "https://api.groq.com/openai/v1"),
            model: env_or("LLM_MODEL", "llama3-8b-8192"),
            temperature: env_parse("LLM_TEMPERATURE", 0.1)?,
            max_tokens: env_parse("LLM_MAX_TOKENS", 1024)?,
            request_timeout: Duration::from_secs(env_parse(
                "LLM_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT.as_secs(),
            )?),
        })
    }
}

/// Exponential backoff applied uniformly to rate-limited model calls
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    pub randomization_factor: f64,
    /// Hard ceiling on retries after the first call
    pub max_retries: u32,
    /// Hard ceiling on total time spent backing off
    pub max_elapsed: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(60),
            multiplier: 2.0,
            randomization_factor: 0.5,
            max_retries: 6,
            max_elapsed: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum number of repair cycles per run
    pub max_retry: u32,
    pub dialect: SqlDialect,
    /// Treat a successful query with zero rows as a failure to diagnose
    pub empty_result_is_failure: bool,
    pub run_timeout: Option<Duration>,
    pub rate_limit: RateLimitPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retry: 3,
            dialect: SqlDialect::MySql,
            empty_result_is_failure: true,
            run_timeout: Some(Duration::from_secs(120)),
            rate_limit: RateLimitPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let run_timeout_secs: u64 = env_parse("RUN_TIMEOUT_SECS", 120)?;

        Ok(Self {
            max_retry: env_parse("MAX_RETRY", defaults.max_retry)?,
            dialect: env_parse("SQL_DIALECT", defaults.dialect)?,
            empty_result_is_failure: env_parse("EMPTY_RESULT_IS_FAILURE", defaults.empty_result_is_failure)?,
            run_timeout: (run_timeout_secs > 0).then(|| Duration::from_secs(run_timeout_secs)),
            rate_limit: defaults.rate_limit,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => parse_value(key, &raw),
        _ => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| PipelineError::Config(format!("Invalid value '{}' for {}: {}", raw, key, e)))
}
