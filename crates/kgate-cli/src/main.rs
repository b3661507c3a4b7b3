//! kgate CLI: knowledge gateway MCP server and operator tools
//!
//! Commands: serve, save, search, get, delete, promote, accept,
//! collections, config

mod backend;
mod config;

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use rmcp::ServiceExt;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use kgate_core::{CollectionSchema, LifecycleError, PromotionWorkflow};
use kgate_mcp::{KgateMcpService, KnowledgeHandlers};
use kgate_store::CollectionAdmin;

use crate::backend::Backend;
use crate::config::{BackendKind, ConfigLoader, KgateConfig};

#[derive(Parser)]
#[command(name = "kgate")]
#[command(version)]
#[command(about = "Knowledge gateway: MCP tools over a managed vector-search backend")]
struct Cli {
    /// Configuration file (default: ./kgate.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    Stdio,
    Http,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP server
    Serve {
        #[arg(long, value_enum, default_value = "http")]
        transport: Transport,
        /// Override the configured port (http only)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Save a new personal draft
    Save {
        #[arg(long)]
        content: String,
        #[arg(long)]
        title: Option<String>,
        /// Comma-separated tags
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },
    /// Semantic search
    #[command(alias = "s")]
    Search {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print one record as JSON
    Get { id: String },
    /// Delete a record
    #[command(alias = "rm")]
    Delete { id: String },
    /// Propose a draft for promotion
    Promote {
        id: String,
        #[arg(long)]
        pr_url: Option<String>,
    },
    /// Accept a proposal into team knowledge (run after the PR merges)
    Accept {
        /// Knowledge id of the proposal
        #[arg(required_unless_present = "pr_url", conflicts_with = "pr_url")]
        id: Option<String>,
        /// Find the proposal by its pull request instead of its id
        #[arg(long)]
        pr_url: Option<String>,
        /// Repository path of the merged knowledge file
        #[arg(long)]
        github_path: String,
    },
    /// Create or delete the backing collections
    Collections {
        #[command(subcommand)]
        action: CollectionAction,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Subcommand)]
enum CollectionAction {
    /// Create the knowledge and archive collections
    Create,
    /// Purge and delete both collections
    Delete,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn handlers(backend: &Backend, config: &KgateConfig) -> KnowledgeHandlers {
    KnowledgeHandlers::new(backend.knowledge.clone())
        .with_include_content(config.search.include_content)
}

async fn serve(
    backend: Backend,
    config: &KgateConfig,
    transport: Transport,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let service = KgateMcpService::with_handlers(handlers(&backend, config));
    match transport {
        Transport::Stdio => {
            info!("serving MCP over stdio");
            service.serve(rmcp::transport::stdio()).await?.waiting().await?;
        }
        Transport::Http => {
            let port = port.unwrap_or(config.port);
            kgate_mcp::http::serve(service, (config.host.as_str(), port)).await?;
        }
    }
    Ok(())
}

async fn collections(config: &KgateConfig, action: CollectionAction) -> anyhow::Result<()> {
    if config.backend != BackendKind::VectorSearch {
        bail!("collections are only managed for the vector-search backend");
    }
    let client = backend::vector_search_client(config).await?;
    let admin = CollectionAdmin::new(&client);

    let schemas = [
        CollectionSchema::knowledge(&config.collection),
        CollectionSchema::archived_knowledge(&config.archive_collection),
    ];
    let mut results = serde_json::Map::new();
    for schema in &schemas {
        let outcome = match action {
            CollectionAction::Create => admin.create(schema).await?,
            CollectionAction::Delete => admin.delete(&schema.name).await?,
        };
        results.insert(schema.name.clone(), serde_json::to_value(outcome)?);
    }
    print_json(&results)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_path(path);
    }
    let config = loader.load().context("failed to load configuration")?;

    match cli.command {
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config.redacted())?);
            Ok(())
        }
        Commands::Collections { action } => collections(&config, action).await,
        command => {
            let backend = backend::connect(&config).await?;
            match command {
                Commands::Serve { transport, port } => {
                    serve(backend, &config, transport, port).await
                }
                Commands::Save {
                    content,
                    title,
                    tags,
                } => {
                    let tags = (!tags.is_empty()).then_some(tags);
                    let response = handlers(&backend, &config)
                        .save(title.as_deref(), &content, tags)
                        .await?;
                    print_json(&response)
                }
                Commands::Search { query, limit } => {
                    let hits = handlers(&backend, &config).search(&query, limit).await?;
                    print_json(&hits)
                }
                Commands::Get { id } => match backend.knowledge.get(&id).await? {
                    Some(knowledge) => print_json(&knowledge),
                    None => bail!(LifecycleError::KnowledgeNotFound),
                },
                Commands::Delete { id } => {
                    let response = handlers(&backend, &config).delete(&id).await?;
                    print_json(&response)
                }
                Commands::Promote { id, pr_url } => {
                    let response = handlers(&backend, &config)
                        .promote(&id, pr_url.as_deref())
                        .await?;
                    print_json(&response)
                }
                Commands::Accept {
                    id,
                    pr_url,
                    github_path,
                } => {
                    let workflow = PromotionWorkflow::new(backend.knowledge, backend.archive);
                    let outcome = match (id, pr_url) {
                        (_, Some(pr_url)) => workflow.accept_merged_pr(&pr_url, &github_path).await?,
                        (Some(id), None) => workflow.accept(&id, &github_path).await?,
                        (None, None) => bail!("id or --pr-url is required"),
                    };
                    print_json(&serde_json::json!({
                        "team": outcome.team,
                        "archived": outcome.archived,
                        "already_completed": outcome.already_completed,
                    }))
                }
                Commands::Config | Commands::Collections { .. } => Ok(()),
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries JSON output and stdio JSON-RPC.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kgate=info")),
        )
        .with_target(false)
        .init();

    run(Cli::parse()).await
}
