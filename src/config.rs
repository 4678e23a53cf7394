use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::ingest::DEFAULT_PROGRESS_EVERY;
use crate::source::{DocumentSource, NdjsonSource};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub sync: SyncConfig,
    pub source: SourceConfig,
    pub store: StoreConfig,
}

/// Inputs, outputs and tuning of an ingestion run
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Destination schema text (attribute/entity/relation declarations).
    pub schema_path: PathBuf,
    /// YAML collection mapping.
    pub mapping_path: PathBuf,
    #[serde(default = "default_deadletter_path")]
    pub deadletter_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,
    /// Documents of one collection processed at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

/// Where source documents are read from
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    /// `<dir>/<collection>.ndjson` exports.
    Ndjson { dir: PathBuf },
    /// Live MongoDB; the connection string and database name come from the environment.
    Mongodb {
        #[serde(default = "default_uri_env")]
        uri_env: String,
        #[serde(default = "default_database_env")]
        database_env: String,
    },
}

/// Embedded graph store
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,
}

fn default_deadletter_path() -> PathBuf {
    PathBuf::from("logs/deadletter.ndjson")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_progress_every() -> u64 {
    DEFAULT_PROGRESS_EVERY
}

fn default_concurrency() -> usize {
    1
}

fn default_uri_env() -> String {
    "MONGODB_CONNECTION_STRING".to_string()
}

fn default_database_env() -> String {
    "DB_NAME".to_string()
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

impl Config {
    /// Load and validate configuration
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in GRAPHSYNC_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        let config = Self::read()?;
        config.validate()?;
        Ok(config)
    }

    /// Load without validating, so callers can apply overrides first.
    pub fn read() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var("GRAPHSYNC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", config_path.display()))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.sync.schema_path.is_file() {
            anyhow::bail!(
                "schema_path does not exist: {}. Set sync.schema_path in config.toml.",
                self.sync.schema_path.display()
            );
        }

        if !self.sync.mapping_path.is_file() {
            anyhow::bail!(
                "mapping_path does not exist: {}. Set sync.mapping_path in config.toml.",
                self.sync.mapping_path.display()
            );
        }

        if self.sync.progress_every == 0 {
            anyhow::bail!("sync.progress_every must be greater than 0");
        }

        if self.sync.concurrency == 0 {
            anyhow::bail!("sync.concurrency must be greater than 0");
        }

        match &self.source {
            SourceConfig::Ndjson { dir } => {
                if !dir.is_dir() {
                    anyhow::bail!("source.dir must be a directory: {}", dir.display());
                }
            }
            SourceConfig::Mongodb {
                uri_env,
                database_env,
            } => {
                for var in [uri_env, database_env] {
                    std::env::var(var).with_context(|| {
                        format!(
                            "Environment variable {} not set. Set it in your .env file or as an environment variable.",
                            var
                        )
                    })?;
                }
            }
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.store.db_path
    }

    pub fn migrations_dir(&self) -> &Path {
        &self.store.migrations_dir
    }

    /// Build the configured document source.
    pub async fn document_source(&self) -> Result<Arc<dyn DocumentSource>> {
        match &self.source {
            SourceConfig::Ndjson { dir } => {
                log::info!("Reading NDJSON exports from {}", dir.display());
                Ok(Arc::new(NdjsonSource::new(dir)))
            }
            #[cfg(feature = "mongodb")]
            SourceConfig::Mongodb {
                uri_env,
                database_env,
            } => {
                let uri = std::env::var(uri_env)
                    .with_context(|| format!("Environment variable {} not set", uri_env))?;
                let database = std::env::var(database_env)
                    .with_context(|| format!("Environment variable {} not set", database_env))?;
                let source = crate::source::MongoSource::connect(&uri, &database).await?;
                Ok(Arc::new(source))
            }
            #[cfg(not(feature = "mongodb"))]
            SourceConfig::Mongodb { .. } => {
                anyhow::bail!("source.kind = \"mongodb\" needs a build with the `mongodb` feature")
            }
        }
    }
}
