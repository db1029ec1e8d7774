//! # Folio Web API
//!
//! REST surface over the ingestion pipeline. Creating a task only records
//! it; the runners pick it up and pipeline failures show up in the task's
//! status, never in the response.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check (no auth)
//! - `POST /v1/tasks` - Create an investigate task
//! - `GET /v1/tasks` - List tasks by kind and status
//! - `POST /v1/search` - Full-text search over a project's pages
//!
//! Every `/v1` route requires `Authorization: Bearer <API_TOKEN>`.

use axum::{
    extract::{Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use folio_core::{
    FolioError, IngestionService, IngestionTask, PageHit, TaskKind, TaskStatus, TextSearch,
    DEFAULT_PROJECT,
};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    service: Arc<IngestionService>,
    search: Arc<TextSearch>,
    api_token: Arc<str>,
}

impl AppState {
    pub fn new(service: Arc<IngestionService>, api_token: impl Into<String>) -> Self {
        let search = TextSearch::new(service.index().clone());
        Self {
            service,
            search: Arc::new(search),
            api_token: Arc::from(api_token.into()),
        }
    }
}

/// Router with CORS, request tracing and bearer auth on `/v1`
pub fn app(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/search", post(search_pages))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/health", get(health_check))
        .nest("/v1", v1)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Token from an `Authorization: Bearer <token>` header value
fn bearer_token(value: &str) -> Option<&str> {
    let mut parts = value.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(_scheme), Some(token)) => Some(token),
        _ => None,
    }
}

async fn require_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token);

    if token != Some(&*state.api_token) {
        warn!("Rejected {} {}: no valid token", request.method(), request.uri().path());
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(request).await)
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /health
///
/// ## Response
/// ```json
/// {
///   "status": "ok",
///   "version": "0.3.0"
/// }
/// ```
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[derive(Debug, Deserialize)]
struct CreateTaskRequest {
    lang: String,
    file_path: String,
    project_name: String,
    provider: String,
}

/// POST /v1/tasks
///
/// Queue an Investigate task. Google sources accept either a drive id or a
/// share link.
///
/// ## Request Body
/// ```json
/// {
///   "lang": "eng",
///   "file_path": "1AbCdEf",
///   "project_name": "kgb_project",
///   "provider": "google"
/// }
/// ```
///
/// ## Response
/// The stored task, including its generated `id` and `status: "waiting"`.
async fn create_task(
    State(state): State<AppState>,
    Json(payload): Json<CreateTaskRequest>,
) -> Result<Json<IngestionTask>, ApiError> {
    let task = state
        .service
        .create_investigate_task(
            &payload.file_path,
            &payload.lang,
            &payload.provider,
            &payload.project_name,
        )
        .await?;
    info!("Queued {} in {}", task.label(), task.project_name);
    Ok(Json(task))
}

#[derive(Debug, Deserialize)]
struct TaskListParams {
    kind: Option<TaskKind>,
    status: Option<TaskStatus>,
    page: Option<u32>,
    per_page: Option<u32>,
}

/// GET /v1/tasks
///
/// ## Query Parameters
/// - `kind` - investigate | upload (default: investigate)
/// - `status` - waiting | pending | success | failed
/// - `page` - 1-based page (default: 1)
/// - `per_page` - page size (default: 50, max: 250)
async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<TaskListParams>,
) -> Result<Json<Vec<IngestionTask>>, ApiError> {
    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(50).clamp(1, 250);
    let tasks = state
        .service
        .list_tasks(params.kind.unwrap_or_default(), params.status, page, per_page)
        .await?;
    Ok(Json(tasks))
}

fn default_project() -> String {
    DEFAULT_PROJECT.to_string()
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default = "default_project")]
    project_name: String,
}

/// POST /v1/search
///
/// ## Request Body
/// ```json
/// { "query": "courier network", "project_name": "kgb_project" }
/// ```
///
/// ## Response
/// Matching pages ordered by page number, each with a `snippets` array of
/// highlighted fragments.
async fn search_pages(
    State(state): State<AppState>,
    Json(payload): Json<SearchRequest>,
) -> Result<Json<Vec<PageHit>>, ApiError> {
    if payload.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".to_string()));
    }
    let hits = state
        .search
        .search(&payload.project_name, &payload.query)
        .await?;
    Ok(Json(hits))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("User is not authorized")]
    Unauthorized,
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Core(#[from] FolioError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Core(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Core(FolioError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Core(err) => {
                error!("Request failed: {:?}", err);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Token  abc "), Some("abc"));
        assert_eq!(bearer_token("abc"), None);
        assert_eq!(bearer_token(""), None);
    }

    #[test]
    fn test_error_status() {
        let cases = [
            (ApiError::Unauthorized, StatusCode::UNAUTHORIZED),
            (
                FolioError::UnsupportedProvider("dropbox".into()).into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                FolioError::NotFound("collection".into()).into(),
                StatusCode::NOT_FOUND,
            ),
            (
                FolioError::Source("drive down".into()).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
