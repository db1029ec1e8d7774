//! Core data models for Folio
//!
//! Two record types live in the index: `IngestionTask` (one collection,
//! `tasks`) and `PageRecord` (one collection per project). Field names on
//! the wire match the documents already stored in the index.

use crate::error::{FolioError, Result};
use crate::index::{CollectionSchema, FieldType, IndexRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of the collection holding ingestion tasks
pub const TASKS_COLLECTION: &str = "tasks";

/// Default project used by the search endpoint when none is given
pub const DEFAULT_PROJECT: &str = "kgb_project";

/// Lifecycle state of an ingestion task
///
/// Transitions only ever go `Waiting -> Pending -> Success | Failed`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Waiting,
    Pending,
    Success,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Waiting => "waiting",
            TaskStatus::Pending => "pending",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
        }
    }

    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Waiting, TaskStatus::Pending)
                | (TaskStatus::Pending, TaskStatus::Success)
                | (TaskStatus::Pending, TaskStatus::Failed)
                // crash recovery
                | (TaskStatus::Pending, TaskStatus::Waiting)
        )
    }

    /// States that mean a source is already tracked and must not get a new task
    pub fn tracked() -> [TaskStatus; 3] {
        [TaskStatus::Waiting, TaskStatus::Pending, TaskStatus::Success]
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = FolioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "waiting" => Ok(TaskStatus::Waiting),
            "pending" => Ok(TaskStatus::Pending),
            "success" => Ok(TaskStatus::Success),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(FolioError::Validation(format!("unknown task status {:?}", other))),
        }
    }
}

/// What a task asks the runner to do
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Root request against a single path, possibly a folder
    #[default]
    Investigate,
    /// Concrete per-file ingestion unit produced by fan-out
    Upload,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Investigate => "investigate",
            TaskKind::Upload => "upload",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = FolioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "investigate" => Ok(TaskKind::Investigate),
            "upload" => Ok(TaskKind::Upload),
            other => Err(FolioError::UnsupportedTaskKind(other.to_string())),
        }
    }
}

/// Source backend a task reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// Google Drive, addressed by file/folder id
    Google,
    /// Local filesystem paths and plain HTTP(S) URLs
    Local,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Local => "local",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = FolioError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "google" => Ok(Provider::Google),
            "local" => Ok(Provider::Local),
            other => Err(FolioError::UnsupportedProvider(other.to_string())),
        }
    }
}

/// A unit of ingestion work, stored in the `tasks` collection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestionTask {
    /// Index-generated document id; absent until the task is stored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "lang")]
    pub language: String,
    /// Local path, URL, or remote-drive object id
    #[serde(rename = "file_path")]
    pub source_path: String,
    pub project_name: String,
    #[serde(default)]
    pub status: TaskStatus,
    pub provider: String,
    /// Resolved display name, empty until resolved
    #[serde(default)]
    pub file_name: String,
    #[serde(rename = "task_type", default)]
    pub kind: TaskKind,
    #[serde(default = "default_priority")]
    pub priority: i64,
}

fn default_priority() -> i64 {
    1
}

impl IngestionTask {
    /// A fresh Investigate task in `Waiting` state
    pub fn investigate(
        source_path: impl Into<String>,
        language: impl Into<String>,
        project_name: impl Into<String>,
        provider: Provider,
    ) -> Self {
        Self {
            id: None,
            language: language.into(),
            source_path: source_path.into(),
            project_name: project_name.into(),
            status: TaskStatus::Waiting,
            provider: provider.as_str().to_string(),
            file_name: String::new(),
            kind: TaskKind::Investigate,
            priority: default_priority(),
        }
    }

    /// An Upload task for one discovered file, inheriting language,
    /// provider and project from its parent
    pub fn upload_from(
        parent: &IngestionTask,
        source_path: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            language: parent.language.clone(),
            source_path: source_path.into(),
            project_name: parent.project_name.clone(),
            status: TaskStatus::Waiting,
            provider: parent.provider.clone(),
            file_name: file_name.into(),
            kind: TaskKind::Upload,
            priority: parent.priority,
        }
    }

    /// Validate a raw index record against the task schema
    pub fn from_record(raw: &serde_json::Value) -> Result<Self> {
        let task: IngestionTask = serde_json::from_value(raw.clone())
            .map_err(|e| FolioError::Validation(e.to_string()))?;
        if task.project_name.trim().is_empty() {
            return Err(FolioError::Validation("project_name is empty".into()));
        }
        if task.source_path.trim().is_empty() {
            return Err(FolioError::Validation("file_path is empty".into()));
        }
        Ok(task)
    }

    /// Resolve the provider string into a known backend
    pub fn provider(&self) -> Result<Provider> {
        self.provider.parse()
    }

    /// Human-readable label for logs
    pub fn label(&self) -> String {
        if self.file_name.is_empty() {
            self.source_path.clone()
        } else {
            format!("{} ({})", self.source_path, self.file_name)
        }
    }
}

impl IndexRecord for IngestionTask {
    fn schema(collection: &str) -> CollectionSchema {
        CollectionSchema::new(collection)
            .field("lang", FieldType::String)
            .field("file_path", FieldType::String)
            .field("project_name", FieldType::String)
            .field("status", FieldType::String)
            .field("provider", FieldType::String)
            .field("file_name", FieldType::String)
            .field("task_type", FieldType::String)
            .field("priority", FieldType::Int64)
            .default_sorting_field("priority")
    }
}

/// One page of extracted text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageRecord {
    /// Owning document identifier
    pub file_path: String,
    /// Derived title, constant across a document's pages
    pub book_name: String,
    /// 1-based page number
    pub page_number: u32,
    pub page_content: String,
}

impl IndexRecord for PageRecord {
    fn schema(collection: &str) -> CollectionSchema {
        CollectionSchema::new(collection)
            .field("file_path", FieldType::String)
            .field("book_name", FieldType::String)
            .field("page_number", FieldType::Int64)
            .field("page_content", FieldType::String)
            .default_sorting_field("page_number")
    }
}

/// Document formats the converter framework understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Pdf,
    Word,
}

impl DocumentFormat {
    /// Map a file extension (case-insensitive, with or without the dot)
    pub fn from_extension(ext: &str) -> Result<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => Ok(DocumentFormat::Pdf),
            "docx" | "doc" => Ok(DocumentFormat::Word),
            other => Err(FolioError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Format of a file name or path, judged by its last extension
    pub fn from_file_name(name: &str) -> Result<Self> {
        match name.rsplit_once('.') {
            Some((_, ext)) => Self::from_extension(ext),
            None => Err(FolioError::UnsupportedFormat(name.to_string())),
        }
    }
}
