//! MCP tool definitions for knowledge operations.

use std::sync::Arc;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use kgate_core::{KgateError, KnowledgeRepository, LifecycleError};

use crate::handlers::KnowledgeHandlers;

/// Message returned to callers for any infrastructure failure.
pub const BACKEND_FAILURE: &str = "knowledge backend request failed";

/// kgate MCP server exposing the knowledge tools.
#[derive(Clone)]
pub struct KgateMcpService {
    handlers: KnowledgeHandlers,
    tool_router: ToolRouter<Self>,
}

impl KgateMcpService {
    pub fn new(repo: Arc<dyn KnowledgeRepository>) -> Self {
        Self::with_handlers(KnowledgeHandlers::new(repo))
    }

    pub fn with_handlers(handlers: KnowledgeHandlers) -> Self {
        Self {
            handlers,
            tool_router: Self::tool_router(),
        }
    }
}

/// Map a handler error onto the MCP error channel.
///
/// Input and lifecycle errors carry their message to the caller. Backend
/// detail is logged and replaced by [`BACKEND_FAILURE`].
fn tool_error(tool: &str, err: KgateError) -> McpError {
    match err {
        e if e.is_client_error() => McpError::invalid_params(e.to_string(), None),
        KgateError::NotFound(_) => {
            McpError::invalid_params(LifecycleError::KnowledgeNotFound.to_string(), None)
        }
        e => {
            error!(tool, error = %e, "{BACKEND_FAILURE}");
            McpError::internal_error(BACKEND_FAILURE, None)
        }
    }
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string(value)
        .map_err(|e| McpError::internal_error(format!("failed to encode response: {e}"), None))?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

// === Tool request types ===

/// Request to save a new knowledge draft.
#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct SaveKnowledgeRequest {
    /// Title; derived from the first 30 characters of content when blank
    pub title: Option<String>,
    /// Knowledge text (required)
    #[serde(default)]
    pub content: String,
    /// Optional tags
    pub tags: Option<Vec<String>>,
}

/// Request for semantic search.
#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct SearchKnowledgeRequest {
    /// Search query (required)
    #[serde(default)]
    pub query: String,
    /// Maximum results to return (default: 10)
    pub limit: Option<usize>,
}

/// Request to delete knowledge by id.
#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct DeleteKnowledgeRequest {
    /// Knowledge id (required)
    #[serde(default)]
    pub id: String,
}

/// Request to propose a draft for team promotion.
#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct PromoteKnowledgeRequest {
    /// Knowledge id of a draft (required)
    #[serde(default)]
    pub id: String,
    /// Pull request that proposes the knowledge, if one exists
    pub pr_url: Option<String>,
}

#[tool_router]
impl KgateMcpService {
    /// Save a new personal knowledge draft.
    #[tool(description = "Save knowledge as a personal draft. Title defaults to the start of the content.")]
    async fn save_knowledge(
        &self,
        Parameters(req): Parameters<SaveKnowledgeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let response = self
            .handlers
            .save(req.title.as_deref(), &req.content, req.tags)
            .await
            .map_err(|e| tool_error("save_knowledge", e))?;
        json_result(&response)
    }

    /// Semantic search over saved knowledge.
    #[tool(description = "Search knowledge semantically. Returns id, title, content and score per hit.")]
    async fn search_knowledge(
        &self,
        Parameters(req): Parameters<SearchKnowledgeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let hits = self
            .handlers
            .search(&req.query, req.limit)
            .await
            .map_err(|e| tool_error("search_knowledge", e))?;
        json_result(&hits)
    }

    /// Delete knowledge by id.
    #[tool(description = "Delete knowledge by id. Reports deleted or not_found.")]
    async fn delete_knowledge(
        &self,
        Parameters(req): Parameters<DeleteKnowledgeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let response = self
            .handlers
            .delete(&req.id)
            .await
            .map_err(|e| tool_error("delete_knowledge", e))?;
        json_result(&response)
    }

    /// Move a draft to proposed.
    #[tool(description = "Propose a draft for promotion to team knowledge, optionally linking a pull request.")]
    async fn promote_knowledge(
        &self,
        Parameters(req): Parameters<PromoteKnowledgeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let response = self
            .handlers
            .promote(&req.id, req.pr_url.as_deref())
            .await
            .map_err(|e| tool_error("promote_knowledge", e))?;
        json_result(&response)
    }
}

#[tool_handler]
impl ServerHandler for KgateMcpService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Knowledge gateway. Save personal knowledge, search it semantically, \
                 delete it, and propose drafts for promotion to team knowledge."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
