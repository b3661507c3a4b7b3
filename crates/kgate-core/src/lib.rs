//! # kgate-core
//!
//! Core types, lifecycle rules, and the repository contract for kgate.
//!
//! This crate defines everything the tool layer and the storage backends agree on:
//! - [`Knowledge`]: the stored unit of text, with [`Source`] and [`Status`]
//! - [`ArchivedKnowledge`]: the snapshot taken when a personal record is promoted
//! - [`Lifecycle`]: legal status transitions and valid state combinations
//! - [`KnowledgeRepository`] / [`ArchiveRepository`]: the backend contract
//! - [`InMemoryKnowledgeRepository`] / [`InMemoryArchiveRepository`]: reference backends
//! - [`PromotionWorkflow`]: draft → proposed → promoted, including archival
//! - [`CollectionSchema`]: data/vector schema of the backing collections
//! - Error hierarchy ([`KgateError`], [`ValidationError`], [`LifecycleError`])

pub mod error;
pub mod knowledge;
pub mod lifecycle;
pub mod memory;
pub mod promotion;
pub mod repository;
pub mod schema;

pub use error::{KgateError, LifecycleError, Result, ValidationError};
pub use knowledge::{ArchivedKnowledge, Knowledge, SearchResult, Source, Status, DEFAULT_USER_ID};
pub use lifecycle::{require_non_blank, Lifecycle};
pub use memory::{InMemoryArchiveRepository, InMemoryKnowledgeRepository};
pub use promotion::{promote, AcceptOutcome, PromotionWorkflow};
pub use repository::{ArchiveRepository, KnowledgeRepository, StatusUpdate};
pub use schema::{CollectionSchema, EmbeddingSpec, FieldType};
