use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Rate limited by model provider: {0}")]
    RateLimited(String),

    #[error("Empty response from {0} agent")]
    EmptyResponse(String),

    #[error("Malformed fix plan: {0}")]
    MalformedFixPlan(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No answer: {0}")]
    NoAnswer(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
