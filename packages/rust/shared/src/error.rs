//! Error types for viewsync.
//!
//! Library crates use [`ViewSyncError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Boxed error returned by fragment implementations.
///
/// Fragments own arbitrary data sources, so their failures are carried opaquely
/// and wrapped with document/fragment context by the engine.
pub type FragmentError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for all viewsync operations.
#[derive(Debug, thiserror::Error)]
pub enum ViewSyncError {
    /// Configuration or wiring error (duplicate fragment id, bad config file).
    #[error("config error: {message}")]
    Config { message: String },

    /// A fragment failed to build its slice of a document.
    #[error("fragment '{fragment_id}' failed to build document '{document_id}': {source}")]
    FragmentBuild {
        fragment_id: String,
        document_id: String,
        #[source]
        source: FragmentError,
    },

    /// A fragment's message handler failed.
    #[error("fragment '{fragment_id}' failed to handle message: {source}")]
    FragmentHandler {
        fragment_id: String,
        #[source]
        source: FragmentError,
    },

    /// Unindex combined with reindex/updateFragment for one document in one batch.
    #[error("conflicting instructions for document '{document_id}': unindex combined with an update")]
    Conflict { document_id: String },

    /// Destination store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// One or more documents in a batch failed; siblings ran to completion.
    #[error("{} document(s) failed to reconcile: {}", .failures.len(), summarize(.failures))]
    Batch {
        failures: Vec<(String, ViewSyncError)>,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ViewSyncError>;

impl ViewSyncError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a storage error from any displayable message.
    pub fn storage(msg: impl std::fmt::Display) -> Self {
        Self::Storage(msg.to_string())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Document id this error is attributed to, if any.
    pub fn document_id(&self) -> Option<&str> {
        match self {
            Self::FragmentBuild { document_id, .. } | Self::Conflict { document_id } => {
                Some(document_id)
            }
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ViewSyncError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

fn summarize(failures: &[(String, ViewSyncError)]) -> String {
    failures
        .iter()
        .map(|(id, e)| format!("[{id}] {e}"))
        .collect::<Vec<_>>()
        .join("; ")
}
