//! Error types for FigBridge.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} is not set")]
    MissingEnv(&'static str),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("No result recorded for command {0}")]
    ResultNotFound(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
