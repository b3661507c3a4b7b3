//! Knowledge type: the central unit stored by kgate.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::KgateError;

/// Placeholder user id while the gateway serves a single actor.
pub const DEFAULT_USER_ID: &str = "anonymous";

/// Where a knowledge record lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    #[default]
    Personal,
    Team,
}

impl Source {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Team => "team",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = KgateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "personal" => Ok(Self::Personal),
            "team" => Ok(Self::Team),
            other => Err(KgateError::Serialization(format!(
                "unknown knowledge source '{other}'"
            ))),
        }
    }
}

/// Lifecycle status of a knowledge record.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Draft,
    Proposed,
    Promoted,
}

impl Status {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Proposed => "proposed",
            Self::Promoted => "promoted",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = KgateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "proposed" => Ok(Self::Proposed),
            "promoted" => Ok(Self::Promoted),
            other => Err(KgateError::Serialization(format!(
                "unknown knowledge status '{other}'"
            ))),
        }
    }
}

/// A titled, tagged text record with a lifecycle status.
///
/// Empty strings mean "unset" for `id`, `github_path`, `pr_url` and
/// `promoted_from_id`; which combinations are legal is decided by
/// [`crate::Lifecycle::validate_state`], not by this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Knowledge {
    // === Identity ===
    /// Empty until the first save assigns one.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_user_id")]
    pub user_id: String,

    // === Lifecycle ===
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub status: Status,

    // === GitHub linkage ===
    #[serde(default)]
    pub github_path: String,
    #[serde(default)]
    pub pr_url: String,
    #[serde(default)]
    pub promoted_from_id: String,

    // === Timestamps (assigned by the repository) ===
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Relevance score, only set on search results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

fn default_user_id() -> String {
    DEFAULT_USER_ID.to_string()
}

impl Knowledge {
    /// A new personal draft that has not been persisted yet.
    #[must_use]
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            title: title.into(),
            content: content.into(),
            tags: Vec::new(),
            user_id: default_user_id(),
            source: Source::Personal,
            status: Status::Draft,
            github_path: String::new(),
            pr_url: String::new(),
            promoted_from_id: String::new(),
            created_at: None,
            updated_at: None,
            score: None,
        }
    }

    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Whether a repository has assigned this record an id.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        !self.id.is_empty()
    }
}

/// Snapshot of a personal record taken when it was promoted to the team store.
///
/// Keyed by the original knowledge id. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedKnowledge {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub github_path: String,
    #[serde(default)]
    pub pr_url: String,
    #[serde(default)]
    pub promoted_from_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    // === Archive-specific ===
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    /// Id of the team record created from this one.
    #[serde(default)]
    pub promoted_to_id: String,
}

impl ArchivedKnowledge {
    /// Copy every field of `knowledge`; `archived_at` is left for the repository.
    #[must_use]
    pub fn snapshot(knowledge: &Knowledge, promoted_to_id: impl Into<String>) -> Self {
        Self {
            id: knowledge.id.clone(),
            title: knowledge.title.clone(),
            content: knowledge.content.clone(),
            tags: knowledge.tags.clone(),
            user_id: knowledge.user_id.clone(),
            source: knowledge.source,
            status: knowledge.status,
            github_path: knowledge.github_path.clone(),
            pr_url: knowledge.pr_url.clone(),
            promoted_from_id: knowledge.promoted_from_id.clone(),
            created_at: knowledge.created_at,
            updated_at: knowledge.updated_at,
            archived_at: None,
            promoted_to_id: promoted_to_id.into(),
        }
    }
}

/// Top-k search hits, ranked by descending score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub items: Vec<Knowledge>,
    /// Number of items returned, not the size of the corpus.
    pub total: usize,
}

impl SearchResult {
    #[must_use]
    pub fn from_items(items: Vec<Knowledge>) -> Self {
        let total = items.len();
        Self { items, total }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}
