//! Builds the configured repositories once at startup.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::info;

use kgate_core::{
    ArchiveRepository, InMemoryArchiveRepository, InMemoryKnowledgeRepository,
    KnowledgeRepository,
};
use kgate_store::vector_search::auth::METADATA_BASE_URL;
use kgate_store::{
    discover_project_id, MetadataTokenSource, SqliteKnowledgeStore, StaticToken, TokenSource,
    VectorSearchArchiveRepository, VectorSearchClient, VectorSearchConfig,
    VectorSearchKnowledgeRepository,
};

use crate::config::{BackendKind, KgateConfig};

/// Active knowledge store plus the archive it promotes into.
pub struct Backend {
    pub knowledge: Arc<dyn KnowledgeRepository>,
    pub archive: Arc<dyn ArchiveRepository>,
}

/// Connect the backend named by `config.backend`.
pub async fn connect(config: &KgateConfig) -> anyhow::Result<Backend> {
    match config.backend {
        BackendKind::Memory => {
            info!("using in-memory backend");
            Ok(Backend {
                knowledge: Arc::new(InMemoryKnowledgeRepository::new()),
                archive: Arc::new(InMemoryArchiveRepository::new()),
            })
        }
        BackendKind::Sqlite => {
            let store = Arc::new(
                SqliteKnowledgeStore::open(&config.sqlite_path).with_context(|| {
                    format!("failed to open {}", config.sqlite_path.display())
                })?,
            );
            info!(path = %config.sqlite_path.display(), "using sqlite backend");
            Ok(Backend {
                knowledge: store.clone(),
                archive: store,
            })
        }
        BackendKind::VectorSearch => {
            let client = Arc::new(vector_search_client(config).await?);
            info!(
                project = %client.config().project_id,
                location = %client.config().location,
                collection = %config.collection,
                "using vector search backend"
            );
            Ok(Backend {
                knowledge: Arc::new(VectorSearchKnowledgeRepository::new(
                    client.clone(),
                    &config.collection,
                )),
                archive: Arc::new(VectorSearchArchiveRepository::new(
                    client,
                    &config.archive_collection,
                )),
            })
        }
    }
}

/// REST client for the managed backend, discovering the project if unset.
pub async fn vector_search_client(config: &KgateConfig) -> anyhow::Result<VectorSearchClient> {
    let metadata_http = reqwest::Client::new();

    let project_id = match config.project_id.as_deref().filter(|p| !p.trim().is_empty()) {
        Some(project) => project.to_string(),
        None => match discover_project_id(&metadata_http, METADATA_BASE_URL).await {
            Some(project) => project,
            None => bail!("project_id must be provided or detectable from environment"),
        },
    };

    let tokens: Arc<dyn TokenSource> = match &config.vector_search.access_token {
        Some(token) => Arc::new(StaticToken::new(token.clone())),
        None => Arc::new(MetadataTokenSource::new(metadata_http)),
    };

    let mut vs_config = VectorSearchConfig::new(project_id, config.location.clone());
    vs_config.endpoint.clone_from(&config.vector_search.endpoint);
    vs_config.timeout = Duration::from_secs(config.vector_search.timeout_secs);

    Ok(VectorSearchClient::new(vs_config, tokens)?)
}
