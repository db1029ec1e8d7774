//! Task runner
//!
//! One runner per task kind. It resets Pending leftovers of a previous
//! process, then polls the `tasks` collection for Waiting tasks of its kind
//! and drives each through `Waiting -> Pending -> Success | Failed`.
//! Handler errors and panics end in `Failed` and never stop the loop.

use crate::error::{FolioError, Result};
use crate::index::{ensure_collection, Filter, SearchIndex, SearchParams, TypesenseIndex};
use crate::ingestion::IngestionService;
use crate::models::{IngestionTask, TaskKind, TaskStatus, TASKS_COLLECTION};
use crate::FolioConfig;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Configuration for the runner loop
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Waiting tasks fetched per poll (default: 10)
    pub batch_size: u32,
    /// Sleep after a poll that found nothing (default: 60s)
    pub idle_interval: Duration,
    /// Pending tasks reset per bootstrap pass (default: 10)
    pub reset_page_size: u32,
    /// Upper bound on bootstrap passes, in case resets do not stick
    pub max_reset_passes: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            idle_interval: Duration::from_secs(60),
            reset_page_size: 10,
            max_reset_passes: 1000,
        }
    }
}

impl From<&FolioConfig> for RunnerConfig {
    fn from(config: &FolioConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            idle_interval: Duration::from_secs(config.idle_interval_secs),
            ..Self::default()
        }
    }
}

pub struct TaskRunner {
    kind: TaskKind,
    config: RunnerConfig,
    index: Arc<dyn SearchIndex>,
    service: Arc<IngestionService>,
}

impl TaskRunner {
    pub fn new(kind: TaskKind, service: Arc<IngestionService>, config: RunnerConfig) -> Self {
        Self {
            kind,
            config,
            index: service.index().clone(),
            service,
        }
    }

    /// Runner backed by the configured Typesense node
    pub fn from_config(config: &FolioConfig, kind: TaskKind) -> Result<Self> {
        let index: Arc<dyn SearchIndex> = Arc::new(TypesenseIndex::new(config)?);
        let service = IngestionService::from_config(config, index)?;
        Ok(Self::new(kind, Arc::new(service), RunnerConfig::from(config)))
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    async fn fetch(&self, status: TaskStatus, limit: u32) -> Result<Vec<Value>> {
        let params = SearchParams::all()
            .query_by(["file_path"])
            .filter(Filter::eq("status", status).and(Filter::eq("task_type", self.kind)))
            .per_page(limit);
        Ok(self
            .index
            .search(TASKS_COLLECTION, &params)
            .await?
            .into_documents())
    }

    /// Record `to` for a task the runner knows to be in `from`
    async fn transition(&self, id: &str, from: TaskStatus, to: TaskStatus) -> Result<()> {
        if !from.can_transition_to(to) {
            return Err(FolioError::InvalidTransition {
                id: id.to_string(),
                from,
                to,
            });
        }
        self.index
            .update_document(TASKS_COLLECTION, id, json!({ "status": to }))
            .await?;
        Ok(())
    }

    /// Ensure the tasks collection exists and move every Pending task of
    /// this kind back to Waiting; returns how many were reset
    pub async fn bootstrap(&self) -> Result<usize> {
        ensure_collection::<IngestionTask>(self.index.as_ref(), TASKS_COLLECTION).await?;

        let mut reset = 0;
        for _ in 0..self.config.max_reset_passes {
            let batch = self.fetch(TaskStatus::Pending, self.config.reset_page_size).await?;
            if batch.is_empty() {
                break;
            }
            for raw in batch {
                match raw.get("id").and_then(Value::as_str) {
                    Some(id) => {
                        self.transition(id, TaskStatus::Pending, TaskStatus::Waiting).await?;
                        reset += 1;
                    }
                    None => warn!("Pending task without an id: {}", raw),
                }
            }
        }

        if reset > 0 {
            info!("Reset {} pending {} tasks to waiting", reset, self.kind);
        }
        Ok(reset)
    }

    /// Up to `batch_size` Waiting tasks of this kind, in index order
    pub async fn poll_once(&self) -> Result<Vec<Value>> {
        self.fetch(TaskStatus::Waiting, self.config.batch_size).await
    }

    /// Move the task to Pending only if it is still Waiting
    async fn claim(&self, id: &str) -> Result<bool> {
        let current = self.index.get_document(TASKS_COLLECTION, id).await?;
        let status = current
            .get("status")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<TaskStatus>().ok());
        if status != Some(TaskStatus::Waiting) {
            debug!("Task {} is {:?}, not claiming", id, status);
            return Ok(false);
        }
        self.transition(id, TaskStatus::Waiting, TaskStatus::Pending).await?;
        Ok(true)
    }

    async fn run_handler(&self, task: IngestionTask) -> Result<usize> {
        let service = self.service.clone();
        let handle = tokio::spawn(async move {
            match task.kind {
                TaskKind::Investigate => service.create_upload_tasks(&task).await,
                TaskKind::Upload => service.upload_file_content(&task).await,
            }
        });
        match handle.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => Err(FolioError::Other(format!("Handler panicked: {}", e))),
            Err(e) => Err(e.into()),
        }
    }

    /// Process one raw task record
    ///
    /// The task is claimed before anything else, so malformed records and
    /// tasks of another kind also pass through Pending on their way to
    /// Failed. Returns the final status, or `None` when the task was skipped
    /// because it has no id or another runner already claimed it. Errors are
    /// index failures while recording status; handler failures become
    /// `Failed`.
    #[instrument(skip(self, raw), fields(kind = %self.kind, id))]
    pub async fn process_task(&self, raw: Value) -> Result<Option<TaskStatus>> {
        let Some(id) = raw.get("id").and_then(Value::as_str).map(String::from) else {
            warn!("Task record without an id: {}", raw);
            return Ok(None);
        };
        tracing::Span::current().record("id", id.as_str());

        if !self.claim(&id).await? {
            info!("Task already claimed elsewhere, skipping");
            return Ok(None);
        }

        let task = match IngestionTask::from_record(&raw) {
            Ok(task) => task,
            Err(e) => {
                warn!("Invalid task record: {}", e);
                self.transition(&id, TaskStatus::Pending, TaskStatus::Failed).await?;
                return Ok(Some(TaskStatus::Failed));
            }
        };

        if task.kind != self.kind {
            let e = FolioError::UnsupportedTaskKind(task.kind.to_string());
            warn!("{} runner cannot handle task: {}", self.kind, e);
            self.transition(&id, TaskStatus::Pending, TaskStatus::Failed).await?;
            return Ok(Some(TaskStatus::Failed));
        }

        let label = task.label();
        info!("Processing {} task {}", self.kind, label);
        let status = match self.run_handler(task).await {
            Ok(count) => {
                info!("Task {} succeeded ({} records)", label, count);
                TaskStatus::Success
            }
            Err(e) => {
                error!("Task {} failed: {}", label, e);
                TaskStatus::Failed
            }
        };

        self.transition(&id, TaskStatus::Pending, status).await?;
        Ok(Some(status))
    }

    /// Poll once and process the batch sequentially; returns the batch size
    pub async fn run_once(&self) -> Result<usize> {
        let batch = self.poll_once().await?;
        let count = batch.len();
        for raw in batch {
            if let Err(e) = self.process_task(raw).await {
                error!("Failed to record task status: {}", e);
            }
        }
        Ok(count)
    }

    /// Bootstrap, then poll forever; sleeps when a poll comes back empty
    pub async fn run(&self) -> Result<()> {
        let reset = self.bootstrap().await?;
        info!(
            "Starting {} runner: batch {}, idle {}s, {} tasks reset",
            self.kind,
            self.config.batch_size,
            self.config.idle_interval.as_secs(),
            reset
        );

        loop {
            match self.run_once().await {
                Ok(0) => {
                    debug!("No waiting {} tasks", self.kind);
                    tokio::time::sleep(self.config.idle_interval).await;
                }
                Ok(count) => debug!("Processed {} {} tasks", count, self.kind),
                Err(e) => {
                    error!("Polling failed: {}", e);
                    tokio::time::sleep(self.config.idle_interval).await;
                }
            }
        }
    }
}
