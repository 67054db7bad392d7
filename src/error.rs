// src/error.rs

//! Error type shared by the learning engine.
//!
//! Library code returns [`LearnError`]; the binary wraps it in `anyhow` with
//! context at each I/O boundary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LearnError {
    /// Malformed text or binary input (transition labels, model files, corpora).
    #[error("format error: {0}")]
    Format(String),

    /// A layer or feature vector does not match the declared topology.
    #[error("dimension mismatch: {0}")]
    Dimension(String),

    /// Invalid hyperparameters or field maps.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LearnError>;
