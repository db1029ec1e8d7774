//! Typesense implementation of the search index adapter
//!
//! Every call is a plain async HTTP request; nothing is cached locally.

use super::{
    CollectionSchema, ImportResult, ImportSummary, SearchIndex, SearchParams, SearchResponse,
};
use crate::error::{FolioError, Result};
use crate::FolioConfig;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

const API_KEY_HEADER: &str = "X-TYPESENSE-API-KEY";

/// Client for a single Typesense node
#[derive(Clone)]
pub struct TypesenseIndex {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl TypesenseIndex {
    pub fn new(config: &FolioConfig) -> Result<Self> {
        let base = format!(
            "{}://{}:{}",
            config.typesense_protocol, config.typesense_host, config.typesense_port
        );
        let base_url = Url::parse(&base)
            .map_err(|e| FolioError::Config(format!("Invalid Typesense URL {}: {}", base, e)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.connection_timeout_secs))
            .build()?;

        info!("Using Typesense at {}", base_url);
        Ok(Self {
            client,
            base_url,
            api_key: config.typesense_api_key.clone(),
        })
    }

    /// Build `<base>/<segments...>` with each segment percent-encoded
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FolioError::Config(format!("Cannot use {} as a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn documents_url(&self, collection: &str, rest: &[&str]) -> Result<Url> {
        let mut segments = vec!["collections", collection, "documents"];
        segments.extend_from_slice(rest);
        self.url(&segments)
    }

    /// Map non-success responses onto typed errors
    async fn check(response: Response, what: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from))
            .unwrap_or(body);

        Err(match status {
            StatusCode::NOT_FOUND => FolioError::NotFound(format!("{}: {}", what, message)),
            StatusCode::CONFLICT => FolioError::AlreadyExists(format!("{}: {}", what, message)),
            _ => FolioError::Index {
                status: status.as_u16(),
                message: format!("{}: {}", what, message),
            },
        })
    }
}

/// Parse the JSON-lines body returned by the import endpoint
pub(crate) fn parse_import_lines(body: &str) -> Result<Vec<ImportResult>> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str::<ImportResult>(line).map_err(FolioError::from))
        .collect()
}

#[async_trait]
impl SearchIndex for TypesenseIndex {
    async fn create_collection(&self, schema: &CollectionSchema) -> Result<()> {
        let response = self
            .client
            .post(self.url(&["collections"])?)
            .header(API_KEY_HEADER, &self.api_key)
            .json(schema)
            .send()
            .await?;
        Self::check(response, &format!("create collection {}", schema.name)).await?;
        info!("Created collection {}", schema.name);
        Ok(())
    }

    async fn create_document(&self, collection: &str, document: Value) -> Result<Value> {
        let response = self
            .client
            .post(self.documents_url(collection, &[])?)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&document)
            .send()
            .await?;
        let response = Self::check(response, &format!("create document in {}", collection)).await?;
        Ok(response.json().await?)
    }

    async fn import_documents(
        &self,
        collection: &str,
        documents: Vec<Value>,
    ) -> Result<ImportSummary> {
        let total = documents.len();
        let mut body = String::new();
        for document in &documents {
            body.push_str(&serde_json::to_string(document)?);
            body.push('\n');
        }

        let response = self
            .client
            .post(self.documents_url(collection, &["import"])?)
            .header(API_KEY_HEADER, &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .query(&[("action", "create")])
            .body(body)
            .send()
            .await?;
        let response = Self::check(response, &format!("import into {}", collection)).await?;
        let results = parse_import_lines(&response.text().await?)?;

        if results.len() != total {
            return Err(FolioError::Index {
                status: 200,
                message: format!(
                    "import into {} answered {} lines for {} documents",
                    collection,
                    results.len(),
                    total
                ),
            });
        }

        debug!("Imported {} documents into {}", total, collection);
        Ok(ImportSummary {
            collection: collection.to_string(),
            results,
        })
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<Value> {
        let response = self
            .client
            .get(self.documents_url(collection, &[id])?)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        let response = Self::check(response, &format!("document {} in {}", id, collection)).await?;
        Ok(response.json().await?)
    }

    async fn update_document(&self, collection: &str, id: &str, patch: Value) -> Result<Value> {
        let response = self
            .client
            .patch(self.documents_url(collection, &[id])?)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&patch)
            .send()
            .await?;
        let response = Self::check(response, &format!("update {} in {}", id, collection)).await?;
        Ok(response.json().await?)
    }

    async fn search(&self, collection: &str, params: &SearchParams) -> Result<SearchResponse> {
        let query = params.to_query_pairs()?;
        let response = self
            .client
            .get(self.documents_url(collection, &["search"])?)
            .header(API_KEY_HEADER, &self.api_key)
            .query(&query)
            .send()
            .await?;
        let response = Self::check(response, &format!("search {}", collection)).await?;
        Ok(response.json().await?)
    }
}
