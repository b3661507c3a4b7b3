//! Repository contract every knowledge backend implements.
//!
//! Not-found is an `Ok(None)` / `Ok(false)` result. Anything else that goes
//! wrong talking to the backend is an `Err`, so callers can tell an empty
//! result from an outage.

use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::knowledge::{ArchivedKnowledge, Knowledge, SearchResult, Status};

/// Optional fields written together with a status change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusUpdate {
    pub pr_url: Option<String>,
    pub github_path: Option<String>,
}

impl StatusUpdate {
    #[must_use]
    pub fn with_pr_url(mut self, pr_url: impl Into<String>) -> Self {
        self.pr_url = Some(pr_url.into());
        self
    }

    #[must_use]
    pub fn with_github_path(mut self, github_path: impl Into<String>) -> Self {
        self.github_path = Some(github_path.into());
        self
    }

    /// Write `status`, the supplied fields, and a fresh `updated_at` onto `knowledge`.
    pub fn apply(&self, knowledge: &mut Knowledge, status: Status, now: DateTime<Utc>) {
        knowledge.status = status;
        if let Some(pr_url) = &self.pr_url {
            knowledge.pr_url.clone_from(pr_url);
        }
        if let Some(github_path) = &self.github_path {
            knowledge.github_path.clone_from(github_path);
        }
        knowledge.updated_at = Some(now);
    }
}

/// Persistence and search for active knowledge.
#[async_trait]
pub trait KnowledgeRepository: Send + Sync {
    /// Create (empty id) or upsert (non-empty id) a record.
    ///
    /// Returns the stored record with `id`, `created_at` and `updated_at` set.
    async fn save(&self, knowledge: Knowledge) -> Result<Knowledge>;

    /// Top-`limit` records by descending relevance, each with `score` set.
    async fn search(&self, query: &str, limit: usize) -> Result<SearchResult>;

    async fn get(&self, id: &str) -> Result<Option<Knowledge>>;

    /// `Ok(true)` if a record was removed, `Ok(false)` if none existed.
    async fn delete(&self, id: &str) -> Result<bool>;

    async fn find_by_github_path(&self, path: &str) -> Result<Option<Knowledge>>;

    async fn find_by_pr_url(&self, url: &str) -> Result<Option<Knowledge>>;

    /// The team record created from personal record `id`, if any.
    async fn find_by_promoted_from_id(&self, id: &str) -> Result<Option<Knowledge>>;

    /// Set `status` plus any supplied field and refresh `updated_at`.
    ///
    /// Transition legality is the caller's job. Fails with
    /// [`crate::KgateError::NotFound`] when `id` does not exist.
    async fn update_status(&self, id: &str, status: Status, update: StatusUpdate)
        -> Result<Knowledge>;
}

/// Write-once store of promotion snapshots.
#[async_trait]
pub trait ArchiveRepository: Send + Sync {
    /// Store `archived`, stamping `archived_at` if unset.
    ///
    /// If a snapshot with the same id already exists it is returned unchanged.
    async fn save(&self, archived: ArchivedKnowledge) -> Result<ArchivedKnowledge>;

    async fn get(&self, id: &str) -> Result<Option<ArchivedKnowledge>>;

    /// The snapshot of the personal record that was proposed under `url`.
    async fn find_by_pr_url(&self, url: &str) -> Result<Option<ArchivedKnowledge>>;
}

/// Assign id and timestamps the way every backend does on save.
///
/// `stored_created_at` is the creation time of the record being replaced, if any.
#[must_use]
pub fn prepare_save(
    mut knowledge: Knowledge,
    stored_created_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Knowledge {
    if knowledge.id.is_empty() {
        knowledge.id = Uuid::new_v4().to_string();
    }
    knowledge.created_at = Some(knowledge.created_at.or(stored_created_at).unwrap_or(now));
    knowledge.updated_at = Some(now);
    knowledge.score = None;
    knowledge
}

/// Stable sort by descending score; unscored items go last.
pub fn sort_by_score_desc(items: &mut [Knowledge]) {
    items.sort_by(|a, b| match (a.score, b.score) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}
