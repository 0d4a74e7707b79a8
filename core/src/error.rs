//! Error types for the snapshot/tree converter.
//!
//! Only `FatalConfig` aborts a whole run. Every other category is scoped to a
//! single room, file or widget and is reported through the run summaries.

use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;

/// Error category for structured logging and exit-code mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Zero or several root rooms, a cycle under `fail_on_cycle`, bad config
    FatalConfig,
    /// A metadata, storage, snapshot or descriptor file is absent
    MissingFile,
    /// A JSON file failed to parse
    MalformedJson,
    /// A widget directory lacks one of its four files
    IncompleteWidget,
    /// A link points at a room directory that does not exist
    BrokenLink,
    /// A read or write against the tree failed
    WriteFailure,
    /// A provisioning deletion was refused by the path guard
    RefusedDeletion,
}

impl ErrorCategory {
    /// Machine-readable code for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FatalConfig => "FATAL_CONFIG",
            Self::MissingFile => "MISSING_FILE",
            Self::MalformedJson => "MALFORMED_JSON",
            Self::IncompleteWidget => "INCOMPLETE_WIDGET",
            Self::BrokenLink => "BROKEN_LINK",
            Self::WriteFailure => "WRITE_FAILURE",
            Self::RefusedDeletion => "REFUSED_DELETION",
        }
    }

    /// Whether the enclosing run may continue with sibling rooms
    pub fn run_recoverable(&self) -> bool {
        !matches!(self, Self::FatalConfig)
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {message}")]
    FatalConfig {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("missing file: {}", path.display())]
    MissingFile { path: PathBuf },

    #[error("malformed JSON in {}: {source}", path.display())]
    MalformedJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("incomplete widget {}: missing {missing}", path.display())]
    IncompleteWidget { path: PathBuf, missing: String },

    #[error("link target {target} does not exist under {}", parent.display())]
    BrokenLink { parent: PathBuf, target: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("refusing to delete {}: {reason}", path.display())]
    RefusedDeletion { path: PathBuf, reason: String },
}

impl SyncError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::FatalConfig { .. } => ErrorCategory::FatalConfig,
            Self::MissingFile { .. } => ErrorCategory::MissingFile,
            Self::MalformedJson { .. } => ErrorCategory::MalformedJson,
            Self::IncompleteWidget { .. } => ErrorCategory::IncompleteWidget,
            Self::BrokenLink { .. } => ErrorCategory::BrokenLink,
            Self::Io { .. } => ErrorCategory::WriteFailure,
            Self::RefusedDeletion { .. } => ErrorCategory::RefusedDeletion,
        }
    }

    /// Create a fatal configuration error
    pub fn fatal_config(message: impl Into<String>) -> Self {
        Self::FatalConfig {
            message: message.into(),
            source: None,
        }
    }

    /// Create a fatal configuration error with source
    pub fn fatal_config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::FatalConfig {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn malformed(path: impl AsRef<Path>, source: serde_json::Error) -> Self {
        Self::MalformedJson {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn refused(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::RefusedDeletion {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Result type for converter operations
pub type Result<T> = std::result::Result<T, SyncError>;
