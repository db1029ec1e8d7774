//! Full-text search over a project's pages

use crate::error::Result;
use crate::index::{SearchIndex, SearchParams, SortBy};
use crate::models::PageRecord;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Fields matched by a text query
pub const PAGE_QUERY_FIELDS: [&str; 2] = ["book_name", "page_content"];

/// A matching page with its highlighted fragments
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageHit {
    #[serde(flatten)]
    pub page: PageRecord,
    pub snippets: Vec<String>,
}

pub struct TextSearch {
    index: Arc<dyn SearchIndex>,
    per_page: u32,
}

impl TextSearch {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self { index, per_page: 10 }
    }

    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    /// Pages of `project_name` matching `query`, in page order
    pub async fn search(&self, project_name: &str, query: &str) -> Result<Vec<PageHit>> {
        let params = SearchParams::new(query)
            .query_by(PAGE_QUERY_FIELDS)
            .sort_by(SortBy::asc("page_number"))
            .per_page(self.per_page);
        let response = self.index.search(project_name, &params).await?;
        debug!("Query {:?} on {} found {}", query, project_name, response.found);

        Ok(response
            .hits
            .into_iter()
            .filter_map(|hit| {
                let page = match serde_json::from_value::<PageRecord>(hit.document) {
                    Ok(page) => page,
                    Err(e) => {
                        warn!("Skipping malformed page in {}: {}", project_name, e);
                        return None;
                    }
                };
                let snippets = hit.highlights.into_iter().map(|h| h.snippet).collect();
                Some(PageHit { page, snippets })
            })
            .collect())
    }
}
