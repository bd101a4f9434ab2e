use std::path::PathBuf;

use crate::domain::ArticleId;

/// Core error type.
///
/// Adapter crates should map their specific errors into this type so the
/// conversation engine can tell user-facing failures (validation, not found)
/// apart from storage and publish failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Validation(String),

    #[error("article #{0} not found")]
    NotFound(ArticleId),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("publish error: {0}")]
    Publish(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid path: {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
