//! # Folio Core
//!
//! Asynchronous document ingestion: PDF and Word files from local paths,
//! URLs or Google Drive become per-page text records in a Typesense index.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      Task Runner                         │
//! │   bootstrap → poll (waiting, kind) → claim → handler     │
//! └───────────────┬──────────────────────────┬───────────────┘
//!                 │ upload                   │ investigate
//!                 ▼                          ▼
//! ┌───────────────────────────┐  ┌───────────────────────────┐
//! │   Converter Framework     │  │   Source Enumerator       │
//! │  pdf: detect text/image   │  │  drive folder walk        │
//! │  pdf text │ pdf ocr       │  │  local directory walk     │
//! │  word (synthetic pages)   │  │  dedup against tasks      │
//! └─────────────┬─────────────┘  └─────────────┬─────────────┘
//!               │ pages                        │ upload tasks
//!               ▼                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │              Search Index Adapter (Typesense)            │
//! │        tasks collection  +  one collection per project   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use folio_core::{FolioConfig, TaskKind, TaskRunner};
//!
//! #[tokio::main]
//! async fn main() -> folio_core::Result<()> {
//!     let config = FolioConfig::from_env()?;
//!     let runner = TaskRunner::from_config(&config, TaskKind::Upload)?;
//!     runner.run().await?;
//!     Ok(())
//! }
//! ```

pub mod converter;
pub mod error;
pub mod index;
pub mod ingestion;
pub mod models;
pub mod runner;
pub mod search;
pub mod sources;

pub use error::{FolioError, Result};
pub use models::*;

pub use converter::{Converter, ConverterFactory};
pub use index::{MemoryIndex, SearchIndex, TypesenseIndex};
pub use ingestion::IngestionService;
pub use runner::{RunnerConfig, TaskRunner};
pub use search::{PageHit, TextSearch};
pub use sources::SourceRegistry;

use std::path::PathBuf;
use std::str::FromStr;

/// Process configuration
#[derive(Debug, Clone)]
pub struct FolioConfig {
    /// Typesense connection settings
    pub typesense_host: String,
    pub typesense_port: u16,
    pub typesense_protocol: String,
    pub typesense_api_key: String,
    pub connection_timeout_secs: u64,

    /// Service-account key for the Google Drive provider
    pub google_service_account_file: Option<PathBuf>,

    /// Bearer token accepted by the web API
    pub api_token: String,

    /// Web server bind address
    pub host: String,
    pub port: u16,

    /// Runner: sleep after an empty poll
    pub idle_interval_secs: u64,

    /// Runner: tasks fetched per poll
    pub batch_size: u32,
}

impl Default for FolioConfig {
    fn default() -> Self {
        Self {
            typesense_host: "localhost".into(),
            typesense_port: 8108,
            typesense_protocol: "http".into(),
            typesense_api_key: String::new(),
            connection_timeout_secs: 10,
            google_service_account_file: None,
            api_token: "dev_token".into(),
            host: "127.0.0.1".into(),
            port: 3000,
            idle_interval_secs: 60,
            batch_size: 10,
        }
    }
}

impl FolioConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        config.typesense_api_key = lookup("TYPESENSE_API_KEY")
            .filter(|k| !k.is_empty())
            .ok_or_else(|| FolioError::Config("TYPESENSE_API_KEY is not set".into()))?;
        if let Some(host) = lookup("TYPESENSE_HOST") {
            config.typesense_host = host;
        }
        if let Some(port) = parse_var(&lookup, "TYPESENSE_PORT")? {
            config.typesense_port = port;
        }
        if let Some(protocol) = lookup("TYPESENSE_PROTOCOL") {
            if protocol != "http" && protocol != "https" {
                return Err(FolioError::Config(format!(
                    "TYPESENSE_PROTOCOL must be http or https, got {}",
                    protocol
                )));
            }
            config.typesense_protocol = protocol;
        }
        if let Some(timeout) = parse_var(&lookup, "FOLIO_CONNECTION_TIMEOUT_SECS")? {
            config.connection_timeout_secs = timeout;
        }
        config.google_service_account_file =
            lookup("GOOGLE_SERVICE_ACCOUNT_FILE").map(PathBuf::from);
        if let Some(token) = lookup("API_TOKEN") {
            config.api_token = token;
        }
        if let Some(host) = lookup("FOLIO_HOST") {
            config.host = host;
        }
        if let Some(port) = parse_var(&lookup, "FOLIO_PORT")? {
            config.port = port;
        }
        if let Some(secs) = parse_var(&lookup, "FOLIO_IDLE_SECS")? {
            config.idle_interval_secs = secs;
        }
        if let Some(size) = parse_var::<u32>(&lookup, "FOLIO_BATCH_SIZE")? {
            if size == 0 {
                return Err(FolioError::Config("FOLIO_BATCH_SIZE must be positive".into()));
            }
            config.batch_size = size;
        }

        Ok(config)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| FolioError::Config(format!("{}={:?}: {}", key, raw, e))),
        None => Ok(None),
    }
}
