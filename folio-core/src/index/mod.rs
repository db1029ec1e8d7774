//! Search index adapter
//!
//! The index is the only durable store: tasks and extracted pages both live
//! in it. `SearchIndex` is the uniform surface over collection lifecycle,
//! document CRUD and full-text search; `TypesenseIndex` talks to a real
//! server and `MemoryIndex` keeps everything in process.

use crate::error::{FolioError, Result};
use crate::models::{TaskKind, TaskStatus};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

pub mod memory;
pub mod typesense;

pub use memory::MemoryIndex;
pub use typesense::TypesenseIndex;

// === Schemas ===

/// Field types understood by the index
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Int32,
    Int64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// Collection definition derived from a record type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionSchema {
    pub name: String,
    pub fields: Vec<FieldSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_sorting_field: Option<String>,
}

impl CollectionSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            default_sorting_field: None,
        }
    }

    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldSchema {
            name: name.into(),
            field_type,
        });
        self
    }

    pub fn default_sorting_field(mut self, name: impl Into<String>) -> Self {
        self.default_sorting_field = Some(name.into());
        self
    }
}

/// A record type that can be stored in its own collection
pub trait IndexRecord: Serialize + DeserializeOwned {
    fn schema(collection: &str) -> CollectionSchema;
}

// === Filters ===

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Str(String),
    Int(i64),
}

impl FilterValue {
    /// Backticks keep paths with spaces, commas or slashes intact. The
    /// filter syntax has no escape for a backtick inside one, so such values
    /// are refused rather than altered.
    fn render(&self) -> Result<String> {
        match self {
            FilterValue::Str(s) if s.contains('`') => Err(FolioError::Validation(format!(
                "filter value {:?} contains a backtick",
                s
            ))),
            FilterValue::Str(s) => Ok(format!("`{}`", s)),
            FilterValue::Int(i) => Ok(i.to_string()),
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            FilterValue::Str(s) => value.as_str() == Some(s.as_str()),
            FilterValue::Int(i) => value.as_i64() == Some(*i),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Str(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        FilterValue::Str(s)
    }
}

impl From<i64> for FilterValue {
    fn from(i: i64) -> Self {
        FilterValue::Int(i)
    }
}

impl From<TaskStatus> for FilterValue {
    fn from(status: TaskStatus) -> Self {
        FilterValue::Str(status.as_str().to_string())
    }
}

impl From<TaskKind> for FilterValue {
    fn from(kind: TaskKind) -> Self {
        FilterValue::Str(kind.as_str().to_string())
    }
}

/// Typed filter expression, rendered to Typesense `filter_by` syntax
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, FilterValue),
    In(String, Vec<FilterValue>),
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Filter::Eq(field.into(), value.into())
    }

    pub fn any_of<V: Into<FilterValue>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Filter::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut parts) => {
                parts.push(other);
                Filter::And(parts)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    pub fn to_filter_by(&self) -> Result<String> {
        Ok(match self {
            Filter::Eq(field, value) => format!("{}:={}", field, value.render()?),
            Filter::In(field, values) => {
                let rendered = values
                    .iter()
                    .map(FilterValue::render)
                    .collect::<Result<Vec<_>>>()?;
                format!("{}:=[{}]", field, rendered.join(","))
            }
            Filter::And(parts) => parts
                .iter()
                .map(Filter::to_filter_by)
                .collect::<Result<Vec<_>>>()?
                .join(" && "),
        })
    }

    /// Evaluate against a stored document
    pub fn matches(&self, document: &Value) -> bool {
        match self {
            Filter::Eq(field, value) => document.get(field).is_some_and(|v| value.matches(v)),
            Filter::In(field, values) => document
                .get(field)
                .is_some_and(|v| values.iter().any(|value| value.matches(v))),
            Filter::And(parts) => parts.iter().all(|p| p.matches(document)),
        }
    }
}

// === Search ===

/// Ascending sort on one field
#[derive(Debug, Clone, PartialEq)]
pub struct SortBy {
    pub field: String,
}

impl SortBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    fn render(&self) -> String {
        format!("{}:asc", self.field)
    }
}

/// Parameters of a search request
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    /// Query text; `*` matches everything
    pub q: String,
    pub query_by: Vec<String>,
    pub filter: Option<Filter>,
    pub sort_by: Option<SortBy>,
    /// 1-based page
    pub page: u32,
    pub per_page: u32,
}

impl SearchParams {
    pub fn new(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            query_by: Vec::new(),
            filter: None,
            sort_by: None,
            page: 1,
            per_page: 10,
        }
    }

    /// Match-all query, used for filter-only lookups
    pub fn all() -> Self {
        Self::new("*")
    }

    pub fn query_by<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.query_by = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn sort_by(mut self, sort: SortBy) -> Self {
        self.sort_by = Some(sort);
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    /// Query-string pairs for the Typesense search endpoint
    pub fn to_query_pairs(&self) -> Result<Vec<(&'static str, String)>> {
        let mut pairs = vec![
            ("q", self.q.clone()),
            ("query_by", self.query_by.join(",")),
            ("page", self.page.to_string()),
            ("per_page", self.per_page.to_string()),
        ];
        if let Some(filter) = &self.filter {
            pairs.push(("filter_by", filter.to_filter_by()?));
        }
        if let Some(sort) = &self.sort_by {
            pairs.push(("sort_by", sort.render()));
        }
        Ok(pairs)
    }
}

/// Highlighted fragment of a matched field
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Highlight {
    pub field: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub matched_tokens: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub document: Value,
    #[serde(default)]
    pub highlights: Vec<Highlight>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_match: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchResponse {
    #[serde(default)]
    pub found: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub hits: Vec<SearchHit>,
}

impl SearchResponse {
    /// Raw hit documents in rank order
    pub fn into_documents(self) -> Vec<Value> {
        self.hits.into_iter().map(|hit| hit.document).collect()
    }

    /// Hit documents decoded into records
    pub fn records<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.hits
            .iter()
            .map(|hit| serde_json::from_value(hit.document.clone()).map_err(FolioError::from))
            .collect()
    }
}

// === Import ===

/// Outcome of one record of a bulk import
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
}

/// Aggregate result of a bulk import
#[derive(Debug, Clone, PartialEq)]
pub struct ImportSummary {
    pub collection: String,
    pub results: Vec<ImportResult>,
}

impl ImportSummary {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    /// Any rejected record turns the whole import into an error
    pub fn into_result(self) -> Result<usize> {
        let failed = self.failed();
        if failed > 0 {
            for result in self.results.iter().filter(|r| !r.success).take(5) {
                warn!(
                    "Import into {} rejected a record: {}",
                    self.collection,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            return Err(FolioError::PartialImport {
                collection: self.collection,
                failed,
                total: self.results.len(),
            });
        }
        Ok(self.results.len())
    }
}

// === Adapter contract ===

/// Uniform surface over a search-index service
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Create a collection; an existing one yields `FolioError::AlreadyExists`
    async fn create_collection(&self, schema: &CollectionSchema) -> Result<()>;

    /// Create one document, returning it with its generated `id`
    async fn create_document(&self, collection: &str, document: Value) -> Result<Value>;

    /// Bulk create; per-record outcomes are reported in the summary
    async fn import_documents(
        &self,
        collection: &str,
        documents: Vec<Value>,
    ) -> Result<ImportSummary>;

    async fn get_document(&self, collection: &str, id: &str) -> Result<Value>;

    /// Partial update, last write wins
    async fn update_document(&self, collection: &str, id: &str, patch: Value) -> Result<Value>;

    async fn search(&self, collection: &str, params: &SearchParams) -> Result<SearchResponse>;
}

/// Create the collection for `R` unless it already exists
pub async fn ensure_collection<R: IndexRecord>(index: &dyn SearchIndex, name: &str) -> Result<()> {
    match index.create_collection(&R::schema(name)).await {
        Ok(()) => Ok(()),
        Err(FolioError::AlreadyExists(_)) => {
            debug!("Collection {} already exists", name);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Bulk "create" import of typed records; fails if any record is rejected
pub async fn import_records<R: Serialize>(
    index: &dyn SearchIndex,
    collection: &str,
    records: &[R],
) -> Result<usize> {
    if records.is_empty() {
        debug!("Nothing to import into {}", collection);
        return Ok(0);
    }
    let documents = records
        .iter()
        .map(serde_json::to_value)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    index
        .import_documents(collection, documents)
        .await?
        .into_result()
}
