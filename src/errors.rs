use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpdaterError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Archive error: {0}")]
    Archive(String),
    #[error("Image error: {0}")]
    Image(String),
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Config error: {0}")]
    Config(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Shell integration error: {0}")]
    Shell(String),
}

impl From<zip::result::ZipError> for UpdaterError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(err) => UpdaterError::Io(err),
            other => UpdaterError::Archive(other.to_string()),
        }
    }
}

impl From<image::ImageError> for UpdaterError {
    fn from(err: image::ImageError) -> Self {
        UpdaterError::Image(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, UpdaterError>;
