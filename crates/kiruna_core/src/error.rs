use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Unified error type for kiruna operations
#[derive(Debug, Error)]
pub enum KirunaError {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt graph configuration in '{path}': {source}")]
    CorruptConfiguration {
        path: PathBuf,
        source: serde_json::Error,
    },

    // Protocol errors
    #[error("Malformed sync message: {0}")]
    MalformedMessage(String),

    #[error("Unknown element type '{0}'. Expected 'nodes' or 'connections'")]
    InvalidElementType(String),

    // Client errors
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type alias for kiruna operations
pub type Result<T> = std::result::Result<T, KirunaError>;

/// A serializable representation of KirunaError for HTTP error bodies
#[derive(Debug, Clone, Serialize)]
pub struct SerializableError {
    /// Error kind/variant name
    pub kind: String,
    /// Human-readable error message
    pub message: String,
    /// Associated path (if applicable)
    pub path: Option<PathBuf>,
}

impl From<&KirunaError> for SerializableError {
    fn from(err: &KirunaError) -> Self {
        let kind = match err {
            KirunaError::Io(_) => "Io",
            KirunaError::FileRead { .. } => "FileRead",
            KirunaError::FileWrite { .. } => "FileWrite",
            KirunaError::Json(_) => "Json",
            KirunaError::CorruptConfiguration { .. } => "CorruptConfiguration",
            KirunaError::MalformedMessage(_) => "MalformedMessage",
            KirunaError::InvalidElementType(_) => "InvalidElementType",
            KirunaError::Transport(_) => "Transport",
        }
        .to_string();

        let path = match err {
            KirunaError::FileRead { path, .. } => Some(path.clone()),
            KirunaError::FileWrite { path, .. } => Some(path.clone()),
            KirunaError::CorruptConfiguration { path, .. } => Some(path.clone()),
            _ => None,
        };

        Self {
            kind,
            message: err.to_string(),
            path,
        }
    }
}

impl KirunaError {
    /// Convert to a serializable representation for HTTP responses
    pub fn to_serializable(&self) -> SerializableError {
        SerializableError::from(self)
    }

    /// Whether the error was caused by client input rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            KirunaError::MalformedMessage(_) | KirunaError::InvalidElementType(_)
        )
    }
}
