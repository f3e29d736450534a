use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SitewatchError>;

#[derive(Error, Debug)]
pub enum SitewatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Required input store not found: {}", .0.display())]
    MissingStore(PathBuf),

    #[error("Store error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
