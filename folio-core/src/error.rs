//! Error types for Folio

use crate::models::TaskStatus;
use thiserror::Error;

/// Result type for Folio operations
pub type Result<T> = std::result::Result<T, FolioError>;

/// Errors that can occur in Folio
#[derive(Error, Debug)]
pub enum FolioError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response from the search index
    #[error("Index error ({status}): {message}")]
    Index { status: u16, message: String },

    /// Collection or document already exists; callers bootstrapping
    /// collections treat this as success
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Bulk import finished with rejected records
    #[error("Import into {collection} rejected {failed} of {total} records")]
    PartialImport {
        collection: String,
        failed: usize,
        total: usize,
    },

    /// Task record does not conform to the task schema
    #[error("Validation error: {0}")]
    Validation(String),

    /// Status write that would break the task lifecycle
    #[error("Task {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Unsupported file format {0}")]
    UnsupportedFormat(String),

    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("Unsupported task kind: {0}")]
    UnsupportedTaskKind(String),

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("OCR error: {0}")]
    Ocr(String),

    #[error("Source error: {0}")]
    Source(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl FolioError {
    /// Client-side mistakes: malformed input or unknown formats/providers
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            FolioError::Validation(_)
                | FolioError::UnsupportedFormat(_)
                | FolioError::UnsupportedProvider(_)
                | FolioError::UnsupportedTaskKind(_)
        )
    }
}

impl From<tokio::task::JoinError> for FolioError {
    fn from(err: tokio::task::JoinError) -> Self {
        FolioError::Other(format!("Worker task failed: {}", err))
    }
}
