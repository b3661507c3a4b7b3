//! Error types for kgate.
//!
//! Validation and lifecycle messages are part of the tool contract: callers
//! match on the exact text, so both enums render transparently.

use thiserror::Error;

/// Top-level result type for kgate operations.
pub type Result<T> = std::result::Result<T, KgateError>;

/// Top-level error type for kgate.
#[derive(Debug, Error)]
pub enum KgateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Raised by `update_status` when the id does not exist.
    #[error("knowledge not found: {0}")]
    NotFound(String),

    /// The backend could not be reached or answered with a failure.
    #[error("backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl KgateError {
    /// True for errors caused by the caller's input or the record's state,
    /// as opposed to infrastructure failures.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Lifecycle(_))
    }
}

impl From<serde_json::Error> for KgateError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// A required argument was missing or blank.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("content is required")]
    ContentRequired,

    #[error("id is required")]
    IdRequired,

    #[error("query is required")]
    QueryRequired,

    #[error("github_path is required")]
    GithubPathRequired,

    #[error("pr_url is required")]
    PrUrlRequired,
}

/// A lifecycle rule rejected the requested operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("knowledge not found")]
    KnowledgeNotFound,

    #[error("only draft knowledge can be promoted")]
    NotDraft,

    #[error("only proposed knowledge can be accepted")]
    NotProposed,

    #[error("github_path is already linked to other knowledge")]
    GithubPathConflict { github_path: String, linked_id: String },

    #[error("invalid knowledge state: {0}")]
    InvalidState(String),
}
