use std::path::PathBuf;
use thiserror::Error;

/// The main error type for vocprep operations.
#[derive(Debug, Error)]
pub enum VocprepError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unreadable image {path}: {message}")]
    UnreadableImage { path: PathBuf, message: String },

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to write image {path}: {message}")]
    ImageWrite { path: PathBuf, message: String },

    #[error("Failed to load detection model from {path}: {message}")]
    ModelLoad { path: PathBuf, message: String },

    #[error("Detection failed: {message}")]
    Detection { message: String },

    #[error("Refusing to write annotation {path} without any objects")]
    EmptyAnnotation { path: PathBuf },

    #[error("Failed to parse VOC XML from {path}: {message}")]
    VocXmlParse { path: PathBuf, message: String },

    #[error("Failed to parse config from {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid border color '{0}' (expected '#rrggbb', 'r,g,b', black, white or gray)")]
    InvalidColor(String),

    #[error("Failed to serialize report: {0}")]
    ReportSerialize(#[from] serde_json::Error),
}
