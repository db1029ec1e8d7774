//! In-process search index
//!
//! Mirrors the Typesense behaviour the pipeline relies on: generated string
//! ids, schema checks on write, per-record import outcomes, filter-only
//! lookups ordered by the default sorting field, and simple token matching
//! with `<mark>` highlights. Used for tests and single-process experiments.

use super::{
    CollectionSchema, FieldType, Highlight, ImportResult, ImportSummary, SearchHit, SearchIndex,
    SearchParams, SearchResponse,
};
use crate::error::{FolioError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Words of context kept on each side of the first match in a snippet
const SNIPPET_CONTEXT_WORDS: usize = 8;

struct Collection {
    schema: CollectionSchema,
    documents: Vec<Value>,
    next_id: u64,
}

impl Collection {
    fn check_document(&self, document: &Value, partial: bool) -> std::result::Result<(), String> {
        let object = document
            .as_object()
            .ok_or_else(|| "Document is not a JSON object".to_string())?;

        for field in &self.schema.fields {
            match object.get(&field.name) {
                None if partial => {}
                None => {
                    return Err(format!(
                        "Field `{}` has been declared in the schema, but is not found in the document.",
                        field.name
                    ))
                }
                Some(value) => {
                    let ok = match field.field_type {
                        FieldType::String => value.is_string(),
                        FieldType::Int32 | FieldType::Int64 => value.is_i64() || value.is_u64(),
                    };
                    if !ok {
                        return Err(format!(
                            "Field `{}` must be of type {:?}.",
                            field.name, field.field_type
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.documents
            .iter()
            .position(|d| d.get("id").and_then(Value::as_str) == Some(id))
    }

    fn insert(&mut self, mut document: Value) -> std::result::Result<Value, String> {
        self.check_document(&document, false)?;

        let id = match document.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(_) => return Err("Document's `id` field should be a string.".to_string()),
            None => {
                let id = self.next_id.to_string();
                self.next_id += 1;
                id
            }
        };
        if self.position(&id).is_some() {
            return Err(format!("A document with id {} already exists.", id));
        }

        if let Some(object) = document.as_object_mut() {
            object.insert("id".into(), Value::String(id));
        }
        self.documents.push(document.clone());
        Ok(document)
    }
}

/// Search index held entirely in memory
#[derive(Default)]
pub struct MemoryIndex {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// All documents of a collection in insertion order
    pub fn documents(&self, collection: &str) -> Vec<Value> {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.documents.clone())
            .unwrap_or_default()
    }

    /// Store a document without schema checks, the way a record written by
    /// another client or an older schema would sit in the index
    pub fn insert_unchecked(&self, collection: &str, mut document: Value) -> Result<String> {
        let mut collections = self.collections.write();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| FolioError::NotFound(format!("collection {}", collection)))?;
        let id = coll.next_id.to_string();
        coll.next_id += 1;
        if let Some(object) = document.as_object_mut() {
            object.insert("id".into(), Value::String(id.clone()));
        }
        coll.documents.push(document);
        Ok(id)
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .unwrap_or_default()
            .partial_cmp(&y.as_f64().unwrap_or_default())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

/// Wrap matching words in `<mark>` and keep a window around the first one
fn snippet(text: &str, tokens: &[String]) -> Option<(String, Vec<Value>)> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut first = None;
    let mut matched = Vec::new();
    let marked: Vec<String> = words
        .iter()
        .enumerate()
        .map(|(i, word)| {
            let lower = word.to_lowercase();
            if tokens.iter().any(|t| lower.contains(t.as_str())) {
                first.get_or_insert(i);
                matched.push(Value::String(word.to_string()));
                format!("<mark>{}</mark>", word)
            } else {
                word.to_string()
            }
        })
        .collect();

    let first = first?;
    let start = first.saturating_sub(SNIPPET_CONTEXT_WORDS);
    let end = (first + SNIPPET_CONTEXT_WORDS + 1).min(marked.len());
    Some((marked[start..end].join(" "), matched))
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn create_collection(&self, schema: &CollectionSchema) -> Result<()> {
        let mut collections = self.collections.write();
        if collections.contains_key(&schema.name) {
            return Err(FolioError::AlreadyExists(format!(
                "A collection with name `{}` already exists.",
                schema.name
            )));
        }
        collections.insert(
            schema.name.clone(),
            Collection {
                schema: schema.clone(),
                documents: Vec::new(),
                next_id: 0,
            },
        );
        Ok(())
    }

    async fn create_document(&self, collection: &str, document: Value) -> Result<Value> {
        let mut collections = self.collections.write();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| FolioError::NotFound(format!("collection {}", collection)))?;
        coll.insert(document).map_err(|message| FolioError::Index {
            status: 400,
            message,
        })
    }

    async fn import_documents(
        &self,
        collection: &str,
        documents: Vec<Value>,
    ) -> Result<ImportSummary> {
        let mut collections = self.collections.write();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| FolioError::NotFound(format!("collection {}", collection)))?;

        let results = documents
            .into_iter()
            .map(|document| {
                let raw = document.to_string();
                match coll.insert(document) {
                    Ok(_) => ImportResult {
                        success: true,
                        error: None,
                        document: None,
                    },
                    Err(error) => ImportResult {
                        success: false,
                        error: Some(error),
                        document: Some(raw),
                    },
                }
            })
            .collect();

        Ok(ImportSummary {
            collection: collection.to_string(),
            results,
        })
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<Value> {
        let collections = self.collections.read();
        let coll = collections
            .get(collection)
            .ok_or_else(|| FolioError::NotFound(format!("collection {}", collection)))?;
        coll.position(id)
            .map(|pos| coll.documents[pos].clone())
            .ok_or_else(|| FolioError::NotFound(format!("document {} in {}", id, collection)))
    }

    async fn update_document(&self, collection: &str, id: &str, patch: Value) -> Result<Value> {
        let mut collections = self.collections.write();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| FolioError::NotFound(format!("collection {}", collection)))?;
        coll.check_document(&patch, true)
            .map_err(|message| FolioError::Index { status: 400, message })?;
        let pos = coll
            .position(id)
            .ok_or_else(|| FolioError::NotFound(format!("document {} in {}", id, collection)))?;
        merge(&mut coll.documents[pos], &patch);
        Ok(coll.documents[pos].clone())
    }

    async fn search(&self, collection: &str, params: &SearchParams) -> Result<SearchResponse> {
        let collections = self.collections.read();
        let coll = collections
            .get(collection)
            .ok_or_else(|| FolioError::NotFound(format!("collection {}", collection)))?;
        // same values the remote filter syntax accepts
        if let Some(filter) = &params.filter {
            filter.to_filter_by()?;
        }

        let tokens: Vec<String> = if params.q.trim() == "*" {
            Vec::new()
        } else {
            params.q.split_whitespace().map(str::to_lowercase).collect()
        };

        let mut hits: Vec<(usize, SearchHit)> = coll
            .documents
            .iter()
            .filter(|doc| params.filter.as_ref().map_or(true, |f| f.matches(doc)))
            .filter_map(|doc| {
                if tokens.is_empty() {
                    let hit = SearchHit {
                        document: doc.clone(),
                        highlights: Vec::new(),
                        text_match: None,
                    };
                    return Some((0, hit));
                }
                let mut score = 0;
                let mut highlights = Vec::new();
                for field in &params.query_by {
                    if let Some(text) = doc.get(field).and_then(Value::as_str) {
                        if let Some((snippet, matched_tokens)) = snippet(text, &tokens) {
                            score += matched_tokens.len();
                            highlights.push(Highlight {
                                field: field.clone(),
                                snippet,
                                matched_tokens,
                            });
                        }
                    }
                }
                (score > 0).then(|| {
                    (
                        score,
                        SearchHit {
                            document: doc.clone(),
                            highlights,
                            text_match: Some(score as u64),
                        },
                    )
                })
            })
            .collect();

        // stable sort keeps insertion order among equal keys
        match &params.sort_by {
            Some(sort) => hits.sort_by(|(_, a), (_, b)| {
                compare_values(a.document.get(&sort.field), b.document.get(&sort.field))
            }),
            None => {
                let default_field = coll.schema.default_sorting_field.clone();
                hits.sort_by(|(sa, a), (sb, b)| {
                    sb.cmp(sa).then_with(|| match &default_field {
                        Some(field) => compare_values(b.document.get(field), a.document.get(field)),
                        None => Ordering::Equal,
                    })
                });
            }
        }

        let found = hits.len() as u64;
        let per_page = params.per_page as usize;
        let skip = (params.page.max(1) as usize - 1) * per_page;
        let hits = hits.into_iter().skip(skip).take(per_page).map(|(_, hit)| hit).collect();

        Ok(SearchResponse {
            found,
            page: params.page.max(1),
            hits,
        })
    }
}

fn merge(target: &mut Value, patch: &Value) {
    if let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) {
        for (key, value) in patch {
            if key != "id" {
                target.insert(key.clone(), value.clone());
            }
        }
    } else if let Some(patch) = patch.as_object() {
        *target = Value::Object(patch.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{ensure_collection, Filter, IndexRecord, SortBy};
    use crate::models::{IngestionTask, PageRecord, Provider, TaskStatus, TASKS_COLLECTION};
    use serde_json::json;

    #[tokio::test]
    async fn test_create_collection_twice() {
        let index = MemoryIndex::new();
        let schema = PageRecord::schema("books");
        index.create_collection(&schema).await.unwrap();
        assert!(matches!(
            index.create_collection(&schema).await,
            Err(FolioError::AlreadyExists(_))
        ));
        ensure_collection::<PageRecord>(&index, "books").await.unwrap();
    }

    #[tokio::test]
    async fn test_generated_ids_and_update() {
        let index = MemoryIndex::new();
        ensure_collection::<IngestionTask>(&index, TASKS_COLLECTION).await.unwrap();
        let task = IngestionTask::investigate("folder", "eng", "p", Provider::Google);
        let created = index
            .create_document(TASKS_COLLECTION, serde_json::to_value(&task).unwrap())
            .await
            .unwrap();
        assert_eq!(created["id"], "0");

        let updated = index
            .update_document(TASKS_COLLECTION, "0", json!({"status": "pending"}))
            .await
            .unwrap();
        assert_eq!(updated["status"], "pending");
        assert_eq!(updated["file_path"], "folder");

        assert!(matches!(
            index.update_document(TASKS_COLLECTION, "99", json!({"status": "failed"})).await,
            Err(FolioError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_import_reports_rejected_records() {
        let index = MemoryIndex::new();
        ensure_collection::<PageRecord>(&index, "books").await.unwrap();
        let good = json!({
            "file_path": "a",
            "book_name": "A",
            "page_number": 1,
            "page_content": "x"
        });
        let bad = json!({"file_path": "a", "book_name": "A", "page_content": "x"});
        let summary = index
            .import_documents("books", vec![good, bad])
            .await
            .unwrap();
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.failed(), 1);
        assert_eq!(index.documents("books").len(), 1);
    }

    #[tokio::test]
    async fn test_search_highlights_and_sort() {
        let index = MemoryIndex::new();
        ensure_collection::<PageRecord>(&index, "books").await.unwrap();
        for (n, text) in [(2, "the war ended"), (1, "before the war began"), (3, "peace")] {
            let page = PageRecord {
                file_path: "wp.pdf".into(),
                book_name: "War and Peace".into(),
                page_number: n,
                page_content: text.into(),
            };
            index
                .create_document("books", serde_json::to_value(&page).unwrap())
                .await
                .unwrap();
        }

        let params = SearchParams::new("war")
            .query_by(["page_content"])
            .sort_by(SortBy::asc("page_number"));
        let response = index.search("books", &params).await.unwrap();
        assert_eq!(response.found, 2);
        let pages: Vec<PageRecord> = response.records().unwrap();
        assert_eq!(pages[0].page_number, 1);
        assert_eq!(pages[1].page_number, 2);
        assert_eq!(response.hits[0].highlights[0].snippet, "before the <mark>war</mark> began");
    }

    #[tokio::test]
    async fn test_filter_only_search_uses_default_sort() {
        let index = MemoryIndex::new();
        ensure_collection::<IngestionTask>(&index, TASKS_COLLECTION).await.unwrap();
        let seeded = [
            (1, TaskStatus::Waiting),
            (5, TaskStatus::Waiting),
            (3, TaskStatus::Failed),
        ];
        for (priority, status) in seeded {
            let mut task = IngestionTask::investigate("f", "eng", "p", Provider::Local);
            task.priority = priority;
            task.status = status;
            index
                .create_document(TASKS_COLLECTION, serde_json::to_value(&task).unwrap())
                .await
                .unwrap();
        }
        let params = SearchParams::all().filter(Filter::eq("status", TaskStatus::Waiting));
        let docs = index.search(TASKS_COLLECTION, &params).await.unwrap().into_documents();
        let priorities: Vec<i64> = docs.iter().map(|d| d["priority"].as_i64().unwrap()).collect();
        assert_eq!(priorities, vec![5, 1]);
    }
}
