//! # kgate-mcp
//!
//! MCP (Model Context Protocol) server for kgate.
//!
//! Exposes knowledge operations as MCP tools:
//! - `save_knowledge`: Save a personal draft
//! - `search_knowledge`: Semantic search
//! - `delete_knowledge`: Delete by id
//! - `promote_knowledge`: Propose a draft for team promotion
//!
//! Served over stdio or streamable HTTP (see [`http`]).

pub mod handlers;
pub mod http;
pub mod tools;

pub use handlers::{derive_title, KnowledgeHandlers};
pub use tools::KgateMcpService;
