//! HTTP adapter tests
//!
//! The Typesense index, the Drive client with its service-account auth, and
//! URL document loading all run against a local wiremock server.

mod common;

use common::*;
use folio_core::converter::DocumentSource;
use folio_core::index::{ensure_collection, import_records, IndexRecord};
use folio_core::sources::google_drive::ServiceAccountKey;
use folio_core::sources::{is_tracked, DriveApi, GoogleDriveClient, ServiceAccountAuth};
use folio_core::*;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{
    body_string_contains, header, method, path, query_param, query_param_is_missing,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "test-key";

fn typesense(server: &MockServer) -> TypesenseIndex {
    let address = server.address();
    let config = FolioConfig {
        typesense_host: address.ip().to_string(),
        typesense_port: address.port(),
        typesense_protocol: "http".into(),
        typesense_api_key: API_KEY.into(),
        ..FolioConfig::default()
    };
    TypesenseIndex::new(&config).unwrap()
}

fn page(number: u32) -> PageRecord {
    PageRecord {
        file_path: "/dossier.pdf".into(),
        book_name: "Dossier".into(),
        page_number: number,
        page_content: format!("page {}", number),
    }
}

// ============================================================================
// Typesense
// ============================================================================

#[tokio::test]
async fn test_existing_collection_is_tolerated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/collections"))
        .and(header("X-TYPESENSE-API-KEY", API_KEY))
        .and(body_string_contains("\"name\":\"tasks\""))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "message": "A collection with name `tasks` already exists."
        })))
        .expect(2)
        .mount(&server)
        .await;

    let index = typesense(&server);
    ensure_collection::<IngestionTask>(&index, TASKS_COLLECTION)
        .await
        .unwrap();

    let err = index
        .create_collection(&IngestionTask::schema(TASKS_COLLECTION))
        .await
        .unwrap_err();
    assert!(matches!(err, FolioError::AlreadyExists(msg) if msg.contains("already exists")));
}

#[tokio::test]
async fn test_status_codes_map_to_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collections/tasks/documents/42"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({ "message": "Could not find a document with id: 42" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/collections/tasks/documents/7"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Not Ready or Lagging"))
        .mount(&server)
        .await;

    let index = typesense(&server);
    let err = index.get_document(TASKS_COLLECTION, "42").await.unwrap_err();
    assert!(matches!(err, FolioError::NotFound(msg) if msg.contains("Could not find")));

    let err = index
        .update_document(TASKS_COLLECTION, "7", json!({ "status": "pending" }))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FolioError::Index { status: 503, message } if message.contains("Not Ready")
    ));
}

#[tokio::test]
async fn test_document_calls_send_api_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collections/tasks/documents/1"))
        .and(header("X-TYPESENSE-API-KEY", API_KEY))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": "1", "status": "waiting" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let document = typesense(&server)
        .get_document(TASKS_COLLECTION, "1")
        .await
        .unwrap();
    assert_eq!(document["status"], "waiting");
}

#[tokio::test]
async fn test_import_with_rejected_line_is_partial() {
    let server = MockServer::start().await;
    let body = [
        json!({ "success": true }).to_string(),
        json!({
            "success": false,
            "error": "Field `page_number` must be an int32.",
            "document": "{\"page_number\":\"two\"}"
        })
        .to_string(),
    ]
    .join("\n");
    Mock::given(method("POST"))
        .and(path("/collections/books/documents/import"))
        .and(query_param("action", "create"))
        .and(header("X-TYPESENSE-API-KEY", API_KEY))
        .and(body_string_contains("\"page_number\":2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(&server)
        .await;

    let err = import_records(&typesense(&server), "books", &[page(1), page(2)])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FolioError::PartialImport { ref collection, failed: 1, total: 2 } if collection == "books"
    ));
}

#[tokio::test]
async fn test_import_line_count_mismatch_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/collections/books/documents/import"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"success\":true}\n"))
        .mount(&server)
        .await;

    let err = import_records(&typesense(&server), "books", &[page(1), page(2)])
        .await
        .unwrap_err();
    assert!(matches!(err, FolioError::Index { status: 200, .. }));
}

#[tokio::test]
async fn test_search_sends_encoded_filter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collections/tasks/documents/search"))
        .and(query_param("q", "*"))
        .and(query_param("query_by", "file_path"))
        .and(query_param(
            "filter_by",
            "file_path:=`/scans/box 7, part 2.pdf` && status:=[`waiting`,`pending`,`success`]",
        ))
        .and(query_param("per_page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "found": 1,
            "page": 1,
            "hits": [{ "document": { "id": "3", "file_path": "/scans/box 7, part 2.pdf" } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let index = typesense(&server);
    assert!(is_tracked(&index, "/scans/box 7, part 2.pdf").await.unwrap());
}

#[tokio::test]
async fn test_backtick_value_never_reaches_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collections/tasks/documents/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "found": 0, "hits": [] })))
        .expect(0)
        .mount(&server)
        .await;

    let err = is_tracked(&typesense(&server), "/scans/odd`name.pdf")
        .await
        .unwrap_err();
    assert!(matches!(err, FolioError::Validation(_)));
}

// ============================================================================
// Google Drive
// ============================================================================

async fn mount_token(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains(
            "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer",
        ))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": "tok-1", "expires_in": 3600 })),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn drive(server: &MockServer) -> GoogleDriveClient {
    let key = ServiceAccountKey {
        client_email: "ingest@folio-test.iam.gserviceaccount.com".into(),
        private_key: include_str!("fixtures/service_account_key.pem").into(),
        token_uri: format!("{}/token", server.uri()),
    };
    let http = reqwest::Client::new();
    GoogleDriveClient::new(http.clone(), ServiceAccountAuth::new(key, http))
        .with_files_url(format!("{}/drive/v3/files", server.uri()))
}

fn file(id: &str, name: &str) -> serde_json::Value {
    json!({ "id": id, "name": name, "mimeType": "application/pdf" })
}

#[tokio::test]
async fn test_list_children_follows_page_tokens() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param("q", "'folder-1' in parents and trashed=false"))
        .and(query_param("pageSize", "1000"))
        .and(query_param_is_missing("pageToken"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "nextPageToken": "p2",
            "files": [file("f-1", "a.pdf"), file("f-2", "b.pdf")]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param("pageToken", "p2"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "files": [file("f-3", "c.pdf")] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    // both pages are fetched with the one cached token
    let children = drive(&server).list_children("folder-1").await.unwrap();
    let ids: Vec<&str> = children.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["f-1", "f-2", "f-3"]);
}

#[tokio::test]
async fn test_metadata_and_download_share_token() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/f-1"))
        .and(query_param_is_missing("alt"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(file("f-1", "report.pdf")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/f-1"))
        .and(query_param("alt", "media"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.5".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let client = drive(&server);
    let meta = client.file_metadata("f-1").await.unwrap();
    assert_eq!(meta.name, "report.pdf");
    assert!(!meta.is_folder());
    assert_eq!(client.download("f-1").await.unwrap(), b"%PDF-1.5".to_vec());
}

#[tokio::test]
async fn test_drive_status_codes_map_to_errors() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/secret"))
        .respond_with(ResponseTemplate::new(403).set_body_string("insufficientFilePermissions"))
        .mount(&server)
        .await;

    let client = drive(&server);
    assert!(matches!(
        client.file_metadata("gone").await,
        Err(FolioError::NotFound(_))
    ));
    assert!(matches!(
        client.download("secret").await,
        Err(FolioError::Auth(msg)) if msg.contains("insufficientFilePermissions")
    ));
}

#[tokio::test]
async fn test_rejected_token_request_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/f-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(file("f-1", "a.pdf")))
        .expect(0)
        .mount(&server)
        .await;

    let err = drive(&server).file_metadata("f-1").await.unwrap_err();
    assert!(matches!(err, FolioError::Auth(msg) if msg.contains("invalid_grant")));
}

// ============================================================================
// URL documents
// ============================================================================

#[tokio::test]
async fn test_url_document_is_downloaded_and_converted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/report.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/pdf")
                .set_body_bytes(text_pdf(1, Some("Remote Report"))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/files/report.pdf?sig=abc", server.uri());
    let mut source = DocumentSource::new(url.clone());
    source.load_content(&reqwest::Client::new()).await.unwrap();
    assert_eq!(source.file_name, "report.pdf");

    let factory = ConverterFactory::new(
        reqwest::Client::new(),
        Arc::new(FakeRasterizer::default()),
        Arc::new(FakeOcr::default()),
    );
    let mut converter = factory
        .create_for_name(source, "report.pdf", "eng")
        .await
        .unwrap();
    let pages = converter.collect_pages().await.unwrap();
    assert_eq!(pages.len(), 2);
    assert!(pages.iter().all(|p| p.book_name == "Remote Report" && p.file_path == url));
}

#[tokio::test]
async fn test_url_document_error_status_fails_load() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/missing.pdf"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut source = DocumentSource::new(format!("{}/files/missing.pdf", server.uri()));
    let err = source
        .load_content(&reqwest::Client::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FolioError::Http(_)));
    assert!(!source.is_loaded());
}
