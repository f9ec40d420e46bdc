//! Error types shared by the parley crates.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or unusable resource (persona list, canned replies, backend setup).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request input that cannot be served.
    #[error("{0}")]
    Validation(String),

    #[error("Model not found: {0}")]
    UnknownModel(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Tokenization error: {0}")]
    Tokenization(String),

    #[error("Model hub error: {0}")]
    HfHub(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
