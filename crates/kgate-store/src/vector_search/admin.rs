//! Collection provisioning: create and delete the backing collections.
//!
//! Both operations are safe to repeat. Creating an existing collection
//! and deleting a missing one are reported, not failed.

use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use kgate_core::{CollectionSchema, KgateError, Result};

use super::records::id_from_name;
use super::{status_error, VectorSearchClient};

const PURGE_PAGE_SIZE: usize = 100;

/// What a provisioning call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionOutcome {
    Created,
    AlreadyExists,
    /// Collection removed after purging this many data objects.
    Deleted { purged: usize },
    NotFound,
}

/// Polling policy for long-running operations.
#[derive(Debug, Clone, Copy)]
pub struct OperationPolling {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for OperationPolling {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 150,
        }
    }
}

/// Creates and deletes collections on one project/location.
pub struct CollectionAdmin<'a> {
    client: &'a VectorSearchClient,
    polling: OperationPolling,
}

impl<'a> CollectionAdmin<'a> {
    pub fn new(client: &'a VectorSearchClient) -> Self {
        Self {
            client,
            polling: OperationPolling::default(),
        }
    }

    #[must_use]
    pub fn with_polling(mut self, polling: OperationPolling) -> Self {
        self.polling = polling;
        self
    }

    /// Create `schema`'s collection and wait for the operation to finish.
    ///
    /// # Errors
    ///
    /// Returns [`KgateError::Backend`] on any failure other than "already exists".
    pub async fn create(&self, schema: &CollectionSchema) -> Result<ProvisionOutcome> {
        let mut body = json!({ "dataSchema": schema.data_schema() });
        if let Some(vectors) = schema.vector_schema() {
            body["vectorSchema"] = vectors;
        }
        let path = format!(
            "{}/collections?collectionId={}",
            self.client.parent_path(),
            urlencoding::encode(&schema.name)
        );

        let (status, operation) = self.client.send(Method::POST, &path, Some(&body)).await?;
        if status == StatusCode::CONFLICT {
            info!(collection = %schema.name, "collection already exists");
            return Ok(ProvisionOutcome::AlreadyExists);
        }
        if !status.is_success() {
            return Err(status_error(&Method::POST, &path, status, &operation));
        }

        self.wait(&operation).await?;
        info!(collection = %schema.name, "collection created");
        Ok(ProvisionOutcome::Created)
    }

    /// Purge every data object in `collection`, then delete the collection.
    ///
    /// # Errors
    ///
    /// Returns [`KgateError::Backend`] on any failure other than "not found".
    pub async fn delete(&self, collection: &str) -> Result<ProvisionOutcome> {
        let collection_path = self.client.collection_path(collection);
        let Some(purged) = self.purge(&collection_path).await? else {
            info!(collection, "collection not found, nothing to delete");
            return Ok(ProvisionOutcome::NotFound);
        };

        let Some(operation) = self
            .client
            .call(Method::DELETE, &collection_path, None)
            .await?
        else {
            return Ok(ProvisionOutcome::NotFound);
        };
        self.wait(&operation).await?;
        info!(collection, purged, "collection deleted");
        Ok(ProvisionOutcome::Deleted { purged })
    }

    /// Delete all data objects page by page. `None` if the collection is missing.
    async fn purge(&self, collection_path: &str) -> Result<Option<usize>> {
        let query_path = format!("{collection_path}/dataObjects:query");
        let batch_path = format!("{collection_path}/dataObjects:batchDelete");
        let mut purged = 0;
        let mut page_token: Option<String> = None;

        loop {
            let mut body = json!({ "pageSize": PURGE_PAGE_SIZE });
            if let Some(token) = &page_token {
                body["pageToken"] = Value::String(token.clone());
            }
            let Some(page) = self.client.call(Method::POST, &query_path, Some(&body)).await? else {
                return Ok(if purged == 0 { None } else { Some(purged) });
            };

            let requests: Vec<Value> = page
                .get("dataObjects")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(|object| object.get("name").and_then(Value::as_str))
                .map(|name| {
                    json!({
                        "name": format!(
                            "{collection_path}/dataObjects/{}",
                            id_from_name(name)
                        )
                    })
                })
                .collect();
            if requests.is_empty() {
                break;
            }

            let count = requests.len();
            self.client
                .call(
                    Method::POST,
                    &batch_path,
                    Some(&json!({ "requests": requests })),
                )
                .await?;
            purged += count;
            info!(purged, "purged data objects");

            page_token = page
                .get("nextPageToken")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .map(str::to_string);
            if page_token.is_none() {
                break;
            }
        }

        Ok(Some(purged))
    }

    /// Poll a long-running operation until `done`.
    async fn wait(&self, operation: &Value) -> Result<()> {
        let mut current = operation.clone();
        for _ in 0..self.polling.max_attempts {
            if current.get("done").and_then(Value::as_bool).unwrap_or(false) {
                return match current.get("error") {
                    Some(error) => Err(KgateError::Backend(format!("operation failed: {error}"))),
                    None => Ok(()),
                };
            }
            let Some(name) = current.get("name").and_then(Value::as_str) else {
                // Synchronous response, nothing to poll.
                return Ok(());
            };
            tokio::time::sleep(self.polling.interval).await;
            current = self
                .client
                .call(Method::GET, name, None)
                .await?
                .ok_or_else(|| KgateError::Backend(format!("operation {name} not found")))?;
        }
        warn!(operation = %operation, "gave up waiting for operation");
        Err(KgateError::Backend("timed out waiting for operation".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mockito::{Matcher, Server};

    use super::*;
    use crate::vector_search::auth::StaticToken;
    use crate::vector_search::VectorSearchConfig;

    const PARENT: &str = "/projects/p/locations/us-central1";

    fn client(server: &Server) -> VectorSearchClient {
        let mut config = VectorSearchConfig::new("p", "us-central1");
        config.endpoint = server.url();
        VectorSearchClient::new(config, Arc::new(StaticToken::new("t"))).unwrap()
    }

    fn fast() -> OperationPolling {
        OperationPolling {
            interval: Duration::from_millis(1),
            max_attempts: 3,
        }
    }

    #[tokio::test]
    async fn create_sends_schemas_and_polls_operation() {
        let mut server = Server::new_async().await;
        let create = server
            .mock("POST", Matcher::Regex(format!("^{PARENT}/collections")))
            .match_body(Matcher::PartialJson(json!({
                "dataSchema": {"type": "object"},
                "vectorSchema": {"content_embedding": {"denseVector": {"dimensions": 768}}}
            })))
            .with_status(200)
            .with_body(r#"{"name": "projects/p/locations/us-central1/operations/op-1", "done": false}"#)
            .create_async()
            .await;
        let poll = server
            .mock("GET", format!("{PARENT}/operations/op-1").as_str())
            .with_status(200)
            .with_body(r#"{"name": "projects/p/locations/us-central1/operations/op-1", "done": true}"#)
            .create_async()
            .await;

        let client = client(&server);
        let outcome = CollectionAdmin::new(&client)
            .with_polling(fast())
            .create(&CollectionSchema::knowledge("knowledge"))
            .await
            .unwrap();

        create.assert_async().await;
        poll.assert_async().await;
        assert_eq!(outcome, ProvisionOutcome::Created);
    }

    #[tokio::test]
    async fn create_existing_collection_is_skipped() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", Matcher::Regex(format!("^{PARENT}/collections")))
            .with_status(409)
            .with_body(r#"{"error": {"code": 409, "message": "already exists"}}"#)
            .create_async()
            .await;

        let client = client(&server);
        let outcome = CollectionAdmin::new(&client)
            .create(&CollectionSchema::archived_knowledge("archived-knowledge"))
            .await
            .unwrap();
        assert_eq!(outcome, ProvisionOutcome::AlreadyExists);
    }

    #[tokio::test]
    async fn failed_operation_is_backend_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", Matcher::Regex(format!("^{PARENT}/collections")))
            .with_status(200)
            .with_body(r#"{"name": "op", "done": true, "error": {"code": 7, "message": "denied"}}"#)
            .create_async()
            .await;

        let client = client(&server);
        let err = CollectionAdmin::new(&client)
            .create(&CollectionSchema::knowledge("knowledge"))
            .await
            .unwrap_err();
        assert!(matches!(err, KgateError::Backend(msg) if msg.contains("denied")));
    }

    #[tokio::test]
    async fn delete_purges_objects_then_collection() {
        let mut server = Server::new_async().await;
        let collection = format!("{PARENT}/collections/knowledge");
        server
            .mock("POST", format!("{collection}/dataObjects:query").as_str())
            .with_status(200)
            .with_body(format!(
                r#"{{"dataObjects": [{{"name": "{0}/dataObjects/a"}}, {{"name": "{0}/dataObjects/b"}}]}}"#,
                collection.trim_start_matches('/')
            ))
            .create_async()
            .await;
        let batch = server
            .mock("POST", format!("{collection}/dataObjects:batchDelete").as_str())
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;
        server
            .mock("DELETE", collection.as_str())
            .with_status(200)
            .with_body(r#"{"done": true}"#)
            .create_async()
            .await;

        let client = client(&server);
        let outcome = CollectionAdmin::new(&client).delete("knowledge").await.unwrap();

        batch.assert_async().await;
        assert_eq!(outcome, ProvisionOutcome::Deleted { purged: 2 });
    }

    #[tokio::test]
    async fn delete_missing_collection_is_not_found() {
        let mut server = Server::new_async().await;
        server
            .mock(
                "POST",
                format!("{PARENT}/collections/knowledge/dataObjects:query").as_str(),
            )
            .with_status(404)
            .create_async()
            .await;

        let client = client(&server);
        let outcome = CollectionAdmin::new(&client).delete("knowledge").await.unwrap();
        assert_eq!(outcome, ProvisionOutcome::NotFound);
    }
}
