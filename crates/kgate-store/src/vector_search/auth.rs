//! Access tokens and project discovery for the managed backend.
//!
//! On Cloud Run and GCE both come from the instance metadata server. A
//! static token from configuration bypasses it for local use.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use kgate_core::{KgateError, Result};

/// Default metadata server base URL.
pub const METADATA_BASE_URL: &str = "http://metadata.google.internal/computeMetadata/v1";

const METADATA_FLAVOR: (&str, &str) = ("Metadata-Flavor", "Google");
const PROJECT_ID_TIMEOUT: Duration = Duration::from_secs(2);
/// Refresh this long before the server-reported expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Supplies bearer tokens for backend requests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String>;
}

/// A fixed token, e.g. from `gcloud auth print-access-token`.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Service-account tokens from the metadata server, cached until near expiry.
pub struct MetadataTokenSource {
    http: Client,
    base_url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl MetadataTokenSource {
    pub fn new(http: Client) -> Self {
        Self::with_base_url(http, METADATA_BASE_URL)
    }

    pub fn with_base_url(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            cached: Mutex::new(None),
        }
    }

    async fn fetch(&self) -> Result<TokenResponse> {
        let url = format!(
            "{}/instance/service-accounts/default/token",
            self.base_url
        );
        let response = self
            .http
            .get(&url)
            .header(METADATA_FLAVOR.0, METADATA_FLAVOR.1)
            .send()
            .await
            .map_err(|e| KgateError::Backend(format!("metadata token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(KgateError::Backend(format!(
                "metadata token request returned {status}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| KgateError::Backend(format!("invalid metadata token response: {e}")))
    }
}

#[async_trait]
impl TokenSource for MetadataTokenSource {
    async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.fetch().await?;
        let lifetime = Duration::from_secs(fresh.expires_in).saturating_sub(EXPIRY_MARGIN);
        debug!(expires_in = fresh.expires_in, "fetched metadata access token");
        *cached = Some(CachedToken {
            value: fresh.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(fresh.access_token)
    }
}

/// Ask the metadata server for the project id.
///
/// Returns `None` on any failure; off-cloud there is no metadata server.
pub async fn discover_project_id(http: &Client, base_url: &str) -> Option<String> {
    let response = http
        .get(format!("{base_url}/project/project-id"))
        .header(METADATA_FLAVOR.0, METADATA_FLAVOR.1)
        .timeout(PROJECT_ID_TIMEOUT)
        .send()
        .await
        .ok()?;
    if !response.status().is_success() {
        return None;
    }
    let project = response.text().await.ok()?;
    let project = project.trim();
    (!project.is_empty()).then(|| project.to_string())
}
