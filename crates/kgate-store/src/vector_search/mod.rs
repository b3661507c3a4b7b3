//! Managed vector-search backend (Vector Search 2.0 collections over REST).
//!
//! Records are data objects keyed by knowledge id. The `knowledge`
//! collection embeds `"{title} {content}"` server-side, so saves send
//! empty vectors and search sends plain text.
//!
//! Only a definite 404 is reported as not-found. Every other failure
//! surfaces as [`KgateError::Backend`].

pub mod admin;
pub mod auth;
mod records;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use kgate_core::repository::{prepare_save, sort_by_score_desc};
use kgate_core::schema::EMBEDDING_FIELD;
use kgate_core::{
    ArchiveRepository, ArchivedKnowledge, CollectionSchema, KgateError, Knowledge,
    KnowledgeRepository, Result, SearchResult, Status, StatusUpdate,
};

use self::auth::TokenSource;
use self::records::{
    archived_data, archived_from_object, knowledge_data, knowledge_from_object, timestamp,
};

pub const DEFAULT_ENDPOINT: &str = "https://vectorsearch.googleapis.com/v1beta";

/// Task type used when embedding search queries.
const QUERY_TASK_TYPE: &str = "QUESTION_ANSWERING";

/// Where the collections live and how to reach them.
#[derive(Debug, Clone)]
pub struct VectorSearchConfig {
    pub endpoint: String,
    pub project_id: String,
    pub location: String,
    pub timeout: Duration,
}

impl VectorSearchConfig {
    pub fn new(project_id: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            project_id: project_id.into(),
            location: location.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Authenticated REST client shared by the repositories and admin calls.
pub struct VectorSearchClient {
    http: Client,
    config: VectorSearchConfig,
    tokens: Arc<dyn TokenSource>,
}

impl VectorSearchClient {
    /// # Errors
    ///
    /// Returns [`KgateError::Config`] when no project id is configured and
    /// [`KgateError::Backend`] if the HTTP client cannot be built.
    pub fn new(config: VectorSearchConfig, tokens: Arc<dyn TokenSource>) -> Result<Self> {
        if config.project_id.trim().is_empty() {
            return Err(KgateError::Config(
                "project_id must be provided or detectable from environment".to_string(),
            ));
        }
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| KgateError::Backend(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            config,
            tokens,
        })
    }

    #[must_use]
    pub fn config(&self) -> &VectorSearchConfig {
        &self.config
    }

    /// `projects/{p}/locations/{l}`
    #[must_use]
    pub fn parent_path(&self) -> String {
        format!(
            "projects/{}/locations/{}",
            self.config.project_id, self.config.location
        )
    }

    /// `projects/{p}/locations/{l}/collections/{collection}`
    #[must_use]
    pub fn collection_path(&self, collection: &str) -> String {
        format!("{}/collections/{collection}", self.parent_path())
    }

    /// Send a request and return the status with the decoded body.
    ///
    /// Transport failures are errors; HTTP error statuses are not.
    pub(crate) async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<(StatusCode, Value)> {
        let url = format!("{}/{path}", self.config.endpoint.trim_end_matches('/'));
        let token = self.tokens.token().await?;

        let mut request = self.http.request(method.clone(), &url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                KgateError::Backend(format!("{method} {path} timed out"))
            } else {
                KgateError::Backend(format!("{method} {path} failed: {e}"))
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| KgateError::Backend(format!("{method} {path}: unreadable body: {e}")))?;
        let value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        debug!(%method, path, %status, "vector search request");
        Ok((status, value))
    }

    /// Like [`Self::send`] but 404 is `None` and other error statuses fail.
    pub(crate) async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>> {
        let (status, value) = self.send(method.clone(), path, body).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error(&method, path, status, &value));
        }
        Ok(Some(value))
    }
}

pub(crate) fn status_error(method: &Method, path: &str, status: StatusCode, body: &Value) -> KgateError {
    let detail = body
        .pointer("/error/message")
        .and_then(Value::as_str)
        .map_or_else(|| body.to_string(), str::to_string);
    KgateError::Backend(format!("{method} {path} returned {status}: {detail}"))
}

fn object_path(collection_path: &str, id: &str) -> String {
    format!("{collection_path}/dataObjects/{}", urlencoding::encode(id))
}

fn output_fields(schema: &CollectionSchema) -> Vec<String> {
    schema.field_names().into_iter().map(str::to_string).collect()
}

/// First data object whose `field` equals `value`, via a filtered query.
async fn query_first(
    client: &VectorSearchClient,
    collection_path: &str,
    output_fields: &[String],
    field: &str,
    value: &str,
) -> Result<Option<Value>> {
    if value.trim().is_empty() {
        return Ok(None);
    }
    let body = json!({
        "filter": { field: { "$eq": value } },
        "outputFields": { "dataFields": output_fields },
        "pageSize": 1,
    });
    let path = format!("{collection_path}/dataObjects:query");
    let Some(response) = client.call(Method::POST, &path, Some(&body)).await? else {
        return Err(KgateError::Backend(format!("{collection_path} not found")));
    };
    Ok(response
        .get("dataObjects")
        .and_then(Value::as_array)
        .and_then(|objects| objects.first())
        .cloned())
}

/// Active knowledge in a searchable collection.
pub struct VectorSearchKnowledgeRepository {
    client: Arc<VectorSearchClient>,
    collection_path: String,
    output_fields: Vec<String>,
}

impl VectorSearchKnowledgeRepository {
    pub fn new(client: Arc<VectorSearchClient>, collection: &str) -> Self {
        Self {
            collection_path: client.collection_path(collection),
            output_fields: output_fields(&CollectionSchema::knowledge(collection)),
            client,
        }
    }

    async fn find_by_field(&self, field: &str, value: &str) -> Result<Option<Knowledge>> {
        query_first(&self.client, &self.collection_path, &self.output_fields, field, value)
            .await?
            .as_ref()
            .map(knowledge_from_object)
            .transpose()
    }

    async fn write(&self, knowledge: &Knowledge, exists: bool) -> Result<()> {
        let data = knowledge_data(knowledge);
        if exists {
            let path = format!(
                "{}?updateMask=data",
                object_path(&self.collection_path, &knowledge.id)
            );
            let body = json!({ "data": data });
            if self.client.call(Method::PATCH, &path, Some(&body)).await?.is_none() {
                return Err(KgateError::NotFound(knowledge.id.clone()));
            }
        } else {
            let path = format!(
                "{}/dataObjects?dataObjectId={}",
                self.collection_path,
                urlencoding::encode(&knowledge.id)
            );
            let body = json!({ "data": data, "vectors": {} });
            if self.client.call(Method::POST, &path, Some(&body)).await?.is_none() {
                return Err(KgateError::Backend(format!("{} not found", self.collection_path)));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl KnowledgeRepository for VectorSearchKnowledgeRepository {
    async fn save(&self, knowledge: Knowledge) -> Result<Knowledge> {
        let existing = if knowledge.id.is_empty() {
            None
        } else {
            self.get(&knowledge.id).await?
        };
        let stored_created_at = existing.as_ref().and_then(|k| k.created_at);
        let saved = prepare_save(knowledge, stored_created_at, Utc::now());

        self.write(&saved, existing.is_some()).await?;
        debug!(id = %saved.id, update = existing.is_some(), "saved knowledge to vector search");
        Ok(saved)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<SearchResult> {
        if query.trim().is_empty() || limit == 0 {
            return Ok(SearchResult::empty());
        }
        let body = json!({
            "semanticSearch": {
                "searchText": query,
                "searchField": EMBEDDING_FIELD,
                "taskType": QUERY_TASK_TYPE,
                "topK": limit,
                "outputFields": { "dataFields": self.output_fields },
            }
        });
        let path = format!("{}/dataObjects:search", self.collection_path);
        let Some(response) = self.client.call(Method::POST, &path, Some(&body)).await? else {
            return Err(KgateError::Backend(format!("{} not found", self.collection_path)));
        };

        let mut items = Vec::new();
        for result in response
            .get("results")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            let Some(object) = result.get("dataObject") else {
                warn!("search result without dataObject skipped");
                continue;
            };
            let mut knowledge = knowledge_from_object(object)?;
            knowledge.score = result.get("distance").and_then(Value::as_f64);
            items.push(knowledge);
        }
        sort_by_score_desc(&mut items);
        items.truncate(limit);

        Ok(SearchResult::from_items(items))
    }

    async fn get(&self, id: &str) -> Result<Option<Knowledge>> {
        if id.is_empty() {
            return Ok(None);
        }
        let path = object_path(&self.collection_path, id);
        self.client
            .call(Method::GET, &path, None)
            .await?
            .as_ref()
            .map(knowledge_from_object)
            .transpose()
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        if id.is_empty() {
            return Ok(false);
        }
        let path = object_path(&self.collection_path, id);
        Ok(self.client.call(Method::DELETE, &path, None).await?.is_some())
    }

    async fn find_by_github_path(&self, path: &str) -> Result<Option<Knowledge>> {
        self.find_by_field("github_path", path).await
    }

    async fn find_by_pr_url(&self, url: &str) -> Result<Option<Knowledge>> {
        self.find_by_field("pr_url", url).await
    }

    async fn find_by_promoted_from_id(&self, id: &str) -> Result<Option<Knowledge>> {
        self.find_by_field("promoted_from_id", id).await
    }

    async fn update_status(
        &self,
        id: &str,
        status: Status,
        update: StatusUpdate,
    ) -> Result<Knowledge> {
        let mut knowledge = self
            .get(id)
            .await?
            .ok_or_else(|| KgateError::NotFound(id.to_string()))?;
        update.apply(&mut knowledge, status, Utc::now());

        // Patch only the fields this update owns.
        let mut fields = vec![
            ("status", json!(knowledge.status.as_str())),
            ("updated_at", timestamp(knowledge.updated_at)),
        ];
        if update.pr_url.is_some() {
            fields.push(("pr_url", json!(knowledge.pr_url)));
        }
        if update.github_path.is_some() {
            fields.push(("github_path", json!(knowledge.github_path)));
        }
        let mask: Vec<String> = fields.iter().map(|(field, _)| format!("data.{field}")).collect();
        let data: Map<String, Value> = fields
            .into_iter()
            .map(|(field, value)| (field.to_string(), value))
            .collect();
        let path = format!(
            "{}?updateMask={}",
            object_path(&self.collection_path, id),
            urlencoding::encode(&mask.join(","))
        );
        let body = json!({ "data": data });
        if self.client.call(Method::PATCH, &path, Some(&body)).await?.is_none() {
            return Err(KgateError::NotFound(id.to_string()));
        }
        Ok(knowledge)
    }
}

/// Promotion snapshots in the non-searchable archive collection.
pub struct VectorSearchArchiveRepository {
    client: Arc<VectorSearchClient>,
    collection_path: String,
    output_fields: Vec<String>,
}

impl VectorSearchArchiveRepository {
    pub fn new(client: Arc<VectorSearchClient>, collection: &str) -> Self {
        Self {
            collection_path: client.collection_path(collection),
            output_fields: output_fields(&CollectionSchema::archived_knowledge(collection)),
            client,
        }
    }
}

#[async_trait]
impl ArchiveRepository for VectorSearchArchiveRepository {
    async fn save(&self, mut archived: ArchivedKnowledge) -> Result<ArchivedKnowledge> {
        if let Some(existing) = self.get(&archived.id).await? {
            return Ok(existing);
        }
        archived.archived_at.get_or_insert_with(Utc::now);

        let path = format!(
            "{}/dataObjects?dataObjectId={}",
            self.collection_path,
            urlencoding::encode(&archived.id)
        );
        let body = json!({ "data": archived_data(&archived), "vectors": {} });
        let (status, value) = self.client.send(Method::POST, &path, Some(&body)).await?;

        if status == StatusCode::CONFLICT {
            // Lost a race with another writer; theirs is the snapshot of record.
            return self
                .get(&archived.id)
                .await?
                .ok_or_else(|| KgateError::Backend(format!("archive {} missing after conflict", archived.id)));
        }
        if !status.is_success() {
            return Err(status_error(&Method::POST, &path, status, &value));
        }
        Ok(archived)
    }

    async fn get(&self, id: &str) -> Result<Option<ArchivedKnowledge>> {
        if id.is_empty() {
            return Ok(None);
        }
        let path = object_path(&self.collection_path, id);
        self.client
            .call(Method::GET, &path, None)
            .await?
            .as_ref()
            .map(archived_from_object)
            .transpose()
    }

    async fn find_by_pr_url(&self, url: &str) -> Result<Option<ArchivedKnowledge>> {
        query_first(&self.client, &self.collection_path, &self.output_fields, "pr_url", url)
            .await?
            .as_ref()
            .map(archived_from_object)
            .transpose()
    }
}
