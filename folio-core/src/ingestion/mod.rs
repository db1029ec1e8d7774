//! Ingestion service
//!
//! The operations the runner and the API call into: create an Investigate
//! task, fan it out into Upload tasks, turn one Upload task into pages, and
//! list tasks.

use crate::converter::{save_pages, ConverterFactory};
use crate::error::{FolioError, Result};
use crate::index::{ensure_collection, import_records, Filter, SearchIndex, SearchParams};
use crate::models::{IngestionTask, PageRecord, Provider, TaskKind, TaskStatus, TASKS_COLLECTION};
use crate::sources::{google_drive::drive_id, SourceRegistry};
use crate::FolioConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct IngestionService {
    index: Arc<dyn SearchIndex>,
    sources: SourceRegistry,
    converters: ConverterFactory,
}

impl IngestionService {
    pub fn new(
        index: Arc<dyn SearchIndex>,
        sources: SourceRegistry,
        converters: ConverterFactory,
    ) -> Self {
        Self {
            index,
            sources,
            converters,
        }
    }

    /// Service with every configured provider and the default OCR stack
    pub fn from_config(config: &FolioConfig, index: Arc<dyn SearchIndex>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connection_timeout_secs))
            .build()?;
        let sources = SourceRegistry::from_config(config, http.clone())?;
        Ok(Self::new(index, sources, ConverterFactory::with_defaults(http)))
    }

    pub fn index(&self) -> &Arc<dyn SearchIndex> {
        &self.index
    }

    /// Fan an Investigate task out into Upload tasks, stored in one bulk import
    pub async fn create_upload_tasks(&self, task: &IngestionTask) -> Result<usize> {
        let source = self.sources.for_task(task)?;
        let uploads = source.discover(task, self.index.as_ref()).await?;
        let created = import_records(self.index.as_ref(), TASKS_COLLECTION, &uploads).await?;
        info!("Created {} upload tasks for {}", created, task.label());
        Ok(created)
    }

    /// Convert the document behind an Upload task and store its pages in the
    /// project's collection
    pub async fn upload_file_content(&self, task: &IngestionTask) -> Result<usize> {
        let source = self.sources.for_task(task)?.open(task).await?;
        let file_name = source.file_name.clone();
        info!("Uploading {}", task.label());

        let mut converter = self
            .converters
            .create_for_name(source, &file_name, &task.language)
            .await?;
        ensure_collection::<PageRecord>(self.index.as_ref(), &task.project_name).await?;
        let saved = save_pages(self.index.as_ref(), &task.project_name, converter.as_mut()).await?;

        info!("Stored {} pages of {} in {}", saved, task.label(), task.project_name);
        Ok(saved)
    }

    /// Store a new Investigate task for `source_path`
    ///
    /// Google sources given as share links are reduced to the drive id.
    /// The tasks collection and the project's page collection are created
    /// if missing.
    pub async fn create_investigate_task(
        &self,
        source_path: &str,
        language: &str,
        provider: &str,
        project_name: &str,
    ) -> Result<IngestionTask> {
        let provider: Provider = provider.parse()?;
        let source_path = match provider {
            Provider::Google => drive_id(source_path),
            Provider::Local => source_path.trim().to_string(),
        };
        for (field, value) in [
            ("file_path", source_path.as_str()),
            ("lang", language),
            ("project_name", project_name),
        ] {
            if value.trim().is_empty() {
                return Err(FolioError::Validation(format!("{} must not be empty", field)));
            }
        }

        ensure_collection::<IngestionTask>(self.index.as_ref(), TASKS_COLLECTION).await?;
        ensure_collection::<PageRecord>(self.index.as_ref(), project_name).await?;

        let task = IngestionTask::investigate(source_path, language, project_name, provider);
        let created = self
            .index
            .create_document(TASKS_COLLECTION, serde_json::to_value(&task)?)
            .await?;
        let task = IngestionTask::from_record(&created)?;
        info!(
            "Created investigate task {} for {}",
            task.id.as_deref().unwrap_or("?"),
            task.label()
        );
        Ok(task)
    }

    /// Tasks of one kind, optionally narrowed to a status, in index order
    ///
    /// Records that fail validation are skipped.
    pub async fn list_tasks(
        &self,
        kind: TaskKind,
        status: Option<TaskStatus>,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<IngestionTask>> {
        let mut filter = Filter::eq("task_type", kind);
        if let Some(status) = status {
            filter = filter.and(Filter::eq("status", status));
        }
        let params = SearchParams::all()
            .query_by(["task_type"])
            .filter(filter)
            .page(page)
            .per_page(per_page);

        let response = self.index.search(TASKS_COLLECTION, &params).await?;
        debug!("Task listing matched {} records", response.found);

        Ok(response
            .into_documents()
            .iter()
            .filter_map(|raw| match IngestionTask::from_record(raw) {
                Ok(task) => Some(task),
                Err(e) => {
                    warn!("Skipping malformed task record: {}", e);
                    None
                }
            })
            .collect())
    }
}
