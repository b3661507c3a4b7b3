//! Configuration loading.
//!
//! Sources are merged in this order (later sources override earlier):
//! 1. Defaults from [`KgateConfig::default`]
//! 2. TOML file (`--config`, else `kgate.toml` in the working directory if present)
//! 3. `KGATE_` environment variables, `__` separating nested keys
//!    (e.g. `KGATE_SEARCH__INCLUDE_CONTENT=false`)
//! 4. Platform variables: `GOOGLE_CLOUD_PROJECT`, `GCP_PROJECT_ID`,
//!    `GCP_LOCATION`, `PORT`

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_CONFIG_FILENAME: &str = "kgate.toml";
const ENV_PREFIX: &str = "KGATE_";

/// Platform variables and the key each one sets, lowest priority first.
const PLATFORM_ENV: &[(&str, &str)] = &[
    ("GOOGLE_CLOUD_PROJECT", "project_id"),
    ("GCP_PROJECT_ID", "project_id"),
    ("GCP_LOCATION", "location"),
    ("PORT", "port"),
];

/// Which repository implementation to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    VectorSearch,
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Whether search hits carry the record content.
    pub include_content: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            include_content: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorSearchSettings {
    pub endpoint: String,
    pub timeout_secs: u64,
    /// Static bearer token; the metadata server is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl Default for VectorSearchSettings {
    fn default() -> Self {
        Self {
            endpoint: kgate_store::vector_search::DEFAULT_ENDPOINT.to_string(),
            timeout_secs: 30,
            access_token: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KgateConfig {
    pub backend: BackendKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub location: String,
    pub collection: String,
    pub archive_collection: String,
    pub host: String,
    pub port: u16,
    pub sqlite_path: PathBuf,
    pub search: SearchSettings,
    pub vector_search: VectorSearchSettings,
}

impl Default for KgateConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::VectorSearch,
            project_id: None,
            location: "us-central1".to_string(),
            collection: "knowledge".to_string(),
            archive_collection: "archived-knowledge".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8080,
            sqlite_path: PathBuf::from("kgate.db"),
            search: SearchSettings::default(),
            vector_search: VectorSearchSettings::default(),
        }
    }
}

impl KgateConfig {
    /// Copy safe to print: the access token is masked.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.vector_search.access_token.is_some() {
            copy.vector_search.access_token = Some("***".to_string());
        }
        copy
    }
}

/// Builds the layered configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this TOML file instead of looking for `kgate.toml`.
    pub fn with_config_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Defaults plus the TOML file, without any environment layer.
    pub fn file_figment(&self) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(KgateConfig::default()));
        match &self.config_path {
            Some(path) => {
                debug!(path = %path.display(), "loading config file");
                figment = figment.merge(Toml::file(path));
            }
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILENAME);
                if default_path.exists() {
                    debug!(path = %default_path.display(), "loading default config file");
                    figment = figment.merge(Toml::file(default_path));
                }
            }
        }
        figment
    }

    /// The full provider stack.
    pub fn figment(&self) -> Figment {
        let mut figment = self
            .file_figment()
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        for &(var, key) in PLATFORM_ENV {
            figment = figment.merge(Env::raw().only(&[var]).map(move |_| key.into()));
        }
        figment
    }

    /// Load and extract the configuration.
    ///
    /// # Errors
    ///
    /// Returns a figment error for a missing explicit file, unreadable
    /// files or ill-typed values.
    pub fn load(&self) -> Result<KgateConfig, figment::Error> {
        if let Some(path) = &self.config_path {
            if !path.exists() {
                return Err(figment::Error::from(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
        }
        self.figment().extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(toml: &str) -> KgateConfig {
        Figment::new()
            .merge(Serialized::defaults(KgateConfig::default()))
            .merge(Toml::string(toml))
            .extract()
            .unwrap()
    }

    #[test]
    fn defaults_match_cloud_run_deployment() {
        let config = KgateConfig::default();
        assert_eq!(config.backend, BackendKind::VectorSearch);
        assert_eq!(config.location, "us-central1");
        assert_eq!(config.collection, "knowledge");
        assert_eq!(config.archive_collection, "archived-knowledge");
        assert_eq!(config.port, 8080);
        assert!(config.search.include_content);
        assert_eq!(config.vector_search.timeout_secs, 30);
        assert!(config.project_id.is_none());
    }

    #[test]
    fn toml_overrides_nested_keys() {
        let config = extract(
            r#"
            backend = "sqlite"
            sqlite_path = "/tmp/k.db"

            [search]
            include_content = false

            [vector_search]
            timeout_secs = 5
            "#,
        );
        assert_eq!(config.backend, BackendKind::Sqlite);
        assert_eq!(config.sqlite_path, PathBuf::from("/tmp/k.db"));
        assert!(!config.search.include_content);
        assert_eq!(config.vector_search.timeout_secs, 5);
        assert_eq!(config.location, "us-central1");
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let result: Result<KgateConfig, _> = Figment::new()
            .merge(Serialized::defaults(KgateConfig::default()))
            .merge(Toml::string(r#"backend = "postgres""#))
            .extract();
        assert!(result.is_err());
    }

    #[test]
    fn missing_explicit_config_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let loader = ConfigLoader::new().with_config_path(dir.path().join("absent.toml"));
        let err = loader.load().unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn explicit_config_file_is_read() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("kgate.toml");
        std::fs::write(&path, "backend = \"memory\"\nport = 9000\n").unwrap();

        let config: KgateConfig = ConfigLoader::new()
            .with_config_path(&path)
            .file_figment()
            .extract()
            .unwrap();
        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn redacted_masks_access_token() {
        let mut config = KgateConfig::default();
        config.vector_search.access_token = Some("ya29.secret".to_string());
        let printed = toml::to_string(&config.redacted()).unwrap();
        assert!(!printed.contains("ya29.secret"));
        assert!(printed.contains("***"));
    }
}
