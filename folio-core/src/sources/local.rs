//! Local filesystem and plain URL connector

use super::{is_tracked, SourceProvider};
use crate::converter::{base_name, is_url, DocumentSource};
use crate::error::Result;
use crate::index::SearchIndex;
use crate::models::{DocumentFormat, IngestionTask, Provider};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Files under a directory, as (absolute path, `/`-prefixed path relative to the root)
fn collect_documents(root: &Path) -> Vec<(String, String)> {
    WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|name| DocumentFormat::from_file_name(name).is_ok())
                .unwrap_or(false)
        })
        .map(|e| {
            let relative: String = e
                .path()
                .strip_prefix(root)
                .unwrap_or(e.path())
                .components()
                .map(|c| format!("/{}", c.as_os_str().to_string_lossy()))
                .collect();
            (e.path().to_string_lossy().to_string(), relative)
        })
        .collect()
}

/// Local paths and HTTP(S) URLs
#[derive(Debug, Clone, Default)]
pub struct LocalSource;

impl LocalSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SourceProvider for LocalSource {
    fn provider(&self) -> Provider {
        Provider::Local
    }

    async fn discover(
        &self,
        task: &IngestionTask,
        index: &dyn SearchIndex,
    ) -> Result<Vec<IngestionTask>> {
        let target = task.source_path.clone();
        let is_dir = !is_url(&target) && tokio::fs::metadata(&target).await?.is_dir();

        let candidates = if is_dir {
            let root = PathBuf::from(&target);
            tokio::task::spawn_blocking(move || collect_documents(&root)).await?
        } else {
            vec![(target.clone(), format!("/{}", base_name(&target)))]
        };
        debug!("{} candidate files under {}", candidates.len(), target);

        let mut tasks = Vec::new();
        for (path, display_name) in candidates {
            // cannot be looked up in the tasks collection
            if path.contains('`') {
                warn!("Skipping {}: backticks are not supported in paths", path);
                continue;
            }
            if is_tracked(index, &path).await? {
                debug!("Skipping tracked file {}", path);
                continue;
            }
            tasks.push(IngestionTask::upload_from(task, path, display_name));
        }

        info!("Found {} new files under {}", tasks.len(), target);
        Ok(tasks)
    }

    async fn open(&self, task: &IngestionTask) -> Result<DocumentSource> {
        Ok(DocumentSource::new(task.source_path.clone()))
    }
}
