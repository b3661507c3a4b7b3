//! Tool request handling independent of the MCP wire layer.
//!
//! Each handler validates its arguments, runs one repository operation
//! (or the promote step of the lifecycle) and shapes the response payload.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use kgate_core::{
    promote, require_non_blank, Knowledge, KnowledgeRepository, Result, Status, ValidationError,
};

/// Characters of content kept in a derived title.
pub const TITLE_PREVIEW_CHARS: usize = 30;
const TITLE_ELLIPSIS: &str = "...";
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Title for a save request: the given one unless blank, else a content preview.
#[must_use]
pub fn derive_title(title: Option<&str>, content: &str) -> String {
    if let Some(title) = title.filter(|t| !t.trim().is_empty()) {
        return title.to_string();
    }
    let mut chars = content.chars();
    let preview: String = chars.by_ref().take(TITLE_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{preview}{TITLE_ELLIPSIS}")
    } else {
        preview
    }
}

// === Responses ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveResponse {
    pub status: String,
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteStatus {
    Deleted,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub status: DeleteStatus,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoteResponse {
    pub status: Status,
    pub id: String,
    pub current_status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
}

/// The four knowledge tools over one repository.
#[derive(Clone)]
pub struct KnowledgeHandlers {
    repo: Arc<dyn KnowledgeRepository>,
    include_content: bool,
}

impl KnowledgeHandlers {
    pub fn new(repo: Arc<dyn KnowledgeRepository>) -> Self {
        Self {
            repo,
            include_content: true,
        }
    }

    /// Whether search hits carry record content.
    #[must_use]
    pub fn with_include_content(mut self, include_content: bool) -> Self {
        self.include_content = include_content;
        self
    }

    pub fn repository(&self) -> &Arc<dyn KnowledgeRepository> {
        &self.repo
    }

    /// Always creates a new personal draft.
    pub async fn save(
        &self,
        title: Option<&str>,
        content: &str,
        tags: Option<Vec<String>>,
    ) -> Result<SaveResponse> {
        require_non_blank(content, ValidationError::ContentRequired)?;

        let knowledge = Knowledge::new(derive_title(title, content), content)
            .with_tags(tags.unwrap_or_default());
        let saved = self.repo.save(knowledge).await?;

        Ok(SaveResponse {
            status: "saved".to_string(),
            id: saved.id,
            title: saved.title,
        })
    }

    pub async fn search(&self, query: &str, limit: Option<usize>) -> Result<Vec<SearchHit>> {
        require_non_blank(query, ValidationError::QueryRequired)?;

        let result = self
            .repo
            .search(query, limit.unwrap_or(DEFAULT_SEARCH_LIMIT))
            .await?;
        Ok(result
            .items
            .into_iter()
            .map(|k| SearchHit {
                id: k.id,
                title: k.title,
                content: self.include_content.then_some(k.content),
                score: k.score,
            })
            .collect())
    }

    pub async fn delete(&self, id: &str) -> Result<DeleteResponse> {
        require_non_blank(id, ValidationError::IdRequired)?;

        let status = if self.repo.delete(id).await? {
            DeleteStatus::Deleted
        } else {
            DeleteStatus::NotFound
        };
        Ok(DeleteResponse {
            status,
            id: id.to_string(),
        })
    }

    pub async fn promote(&self, id: &str, pr_url: Option<&str>) -> Result<PromoteResponse> {
        let updated = promote(self.repo.as_ref(), id, pr_url).await?;
        Ok(PromoteResponse {
            status: updated.status,
            id: updated.id,
            current_status: updated.status,
            pr_url: (!updated.pr_url.is_empty()).then_some(updated.pr_url),
        })
    }
}
