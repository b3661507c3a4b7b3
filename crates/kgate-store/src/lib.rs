//! # kgate-store
//!
//! Storage backends implementing the kgate repository contract:
//! - [`SqliteKnowledgeStore`] for a single-file local store with FTS5 search
//! - [`vector_search`] for managed collections with server-side embeddings

pub mod sqlite;
pub mod vector_search;

pub use sqlite::SqliteKnowledgeStore;
pub use vector_search::admin::{CollectionAdmin, OperationPolling, ProvisionOutcome};
pub use vector_search::auth::{discover_project_id, MetadataTokenSource, StaticToken, TokenSource};
pub use vector_search::{
    VectorSearchArchiveRepository, VectorSearchClient, VectorSearchConfig,
    VectorSearchKnowledgeRepository,
};
