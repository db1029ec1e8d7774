//! Source connectors for different storage providers
//!
//! A provider fans an Investigate target out into Upload tasks and fetches
//! the bytes behind a single Upload task. Files that already have a task in
//! a tracked state are never emitted twice.

use crate::converter::DocumentSource;
use crate::error::{FolioError, Result};
use crate::index::{Filter, SearchIndex, SearchParams};
use crate::models::{IngestionTask, Provider, TaskStatus, TASKS_COLLECTION};
use crate::FolioConfig;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub mod google_drive;
pub mod local;

pub use google_drive::{
    DriveApi, DriveFile, GoogleDriveClient, GoogleDriveSource, ServiceAccountAuth,
};
pub use local::LocalSource;

/// A storage backend tasks can point at
#[async_trait]
pub trait SourceProvider: Send + Sync {
    fn provider(&self) -> Provider;

    /// Upload tasks for every untracked file under the task's source
    async fn discover(
        &self,
        task: &IngestionTask,
        index: &dyn SearchIndex,
    ) -> Result<Vec<IngestionTask>>;

    /// The document behind one Upload task
    async fn open(&self, task: &IngestionTask) -> Result<DocumentSource>;
}

/// Whether a task in Waiting, Pending or Success already exists for `source_id`
pub async fn is_tracked(index: &dyn SearchIndex, source_id: &str) -> Result<bool> {
    let params = SearchParams::all()
        .query_by(["file_path"])
        .filter(
            Filter::eq("file_path", source_id).and(Filter::any_of("status", TaskStatus::tracked())),
        )
        .per_page(1);
    let response = index.search(TASKS_COLLECTION, &params).await?;
    Ok(response.found > 0 || !response.hits.is_empty())
}

/// Providers available to this process, keyed by provider id
#[derive(Clone, Default)]
pub struct SourceRegistry {
    providers: HashMap<Provider, Arc<dyn SourceProvider>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Local paths and URLs always; Google Drive when a service account is configured
    pub fn from_config(config: &FolioConfig, http: reqwest::Client) -> Result<Self> {
        let mut registry = Self::new().with(Arc::new(LocalSource::new()));

        match &config.google_service_account_file {
            Some(key_file) => {
                let auth = ServiceAccountAuth::from_file(key_file, http.clone())?;
                let drive = GoogleDriveClient::new(http, auth);
                registry.register(Arc::new(GoogleDriveSource::new(Arc::new(drive))));
                info!("Google Drive provider enabled");
            }
            None => debug!("GOOGLE_SERVICE_ACCOUNT_FILE not set, Google Drive provider disabled"),
        }

        Ok(registry)
    }

    pub fn register(&mut self, source: Arc<dyn SourceProvider>) {
        self.providers.insert(source.provider(), source);
    }

    pub fn with(mut self, source: Arc<dyn SourceProvider>) -> Self {
        self.register(source);
        self
    }

    pub fn get(&self, provider: Provider) -> Result<Arc<dyn SourceProvider>> {
        self.providers
            .get(&provider)
            .cloned()
            .ok_or_else(|| {
                FolioError::UnsupportedProvider(format!("{} (not configured)", provider))
            })
    }

    /// Resolve the provider named on a task
    pub fn for_task(&self, task: &IngestionTask) -> Result<Arc<dyn SourceProvider>> {
        self.get(task.provider()?)
    }
}
