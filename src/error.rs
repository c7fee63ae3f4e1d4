//! Error types for background removal operations

use crate::session::{Action, Phase};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, BgRemovalError>;

/// Comprehensive error types for background removal operations
#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// Input/output errors outside image decode/encode (model files, sidecars)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Input image path does not exist
    #[error("File '{}' does not exist", .0.display())]
    FileNotFound(PathBuf),

    /// Input image could not be read or decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Background removal failed
    #[error("Processing error: {0}")]
    Processing(String),

    /// Backend inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Result image could not be encoded or written
    #[error("Encode error: {0}")]
    Encode(String),

    /// Unsupported output format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Action not permitted in the current workflow phase
    #[error("Cannot {action} while the session is {phase}")]
    InvalidState { action: Action, phase: Phase },

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of errors as seen by the workflow front ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unreadable, missing or unsupported input
    Decode,
    /// Removal service, inference or model failure
    Processing,
    /// Unwritable path, unsupported output format or disk failure
    Encode,
    /// Action rejected by the state machine
    Rejected,
    /// Invalid options
    Config,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decode => write!(f, "decode"),
            Self::Processing => write!(f, "processing"),
            Self::Encode => write!(f, "encode"),
            Self::Rejected => write!(f, "rejected"),
            Self::Config => write!(f, "config"),
        }
    }
}

impl BgRemovalError {
    /// Classify this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FileNotFound(_) | Self::Decode(_) => ErrorKind::Decode,
            Self::Io(_)
            | Self::Processing(_)
            | Self::Inference(_)
            | Self::Model(_)
            | Self::Internal(_) => ErrorKind::Processing,
            Self::Encode(_) | Self::UnsupportedFormat(_) => ErrorKind::Encode,
            Self::InvalidState { .. } => ErrorKind::Rejected,
            Self::InvalidConfig(_) => ErrorKind::Config,
        }
    }

    /// Whether the error reports a missing input file
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::FileNotFound(_))
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new unsupported format error
    pub fn unsupported_format<S: Into<String>>(format: S) -> Self {
        Self::UnsupportedFormat(format.into())
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a new encode error
    pub fn encode<S: Into<String>>(msg: S) -> Self {
        Self::Encode(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a rejection for an action outside its valid phase
    #[must_use]
    pub fn invalid_state(action: Action, phase: Phase) -> Self {
        Self::InvalidState { action, phase }
    }

    /// Create a missing-file error
    pub fn file_not_found<P: AsRef<Path>>(path: P) -> Self {
        Self::FileNotFound(path.as_ref().to_path_buf())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<Path>>(operation: &str, path: P, error: &std::io::Error) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create model error with troubleshooting context
    pub fn model_error_with_context<P: AsRef<Path>>(
        operation: &str,
        model_path: P,
        error: &str,
        suggestions: &[&str],
    ) -> Self {
        let path_display = model_path.as_ref().display();
        let suggestion_text = if suggestions.is_empty() {
            String::new()
        } else {
            format!(" Suggestions: {}", suggestions.join(", "))
        };

        Self::Model(format!(
            "Failed to {} model '{}': {}.{}",
            operation, path_display, error, suggestion_text
        ))
    }
}
