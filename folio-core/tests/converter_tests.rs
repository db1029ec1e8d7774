//! Converter framework tests
//!
//! PDFs and .docx files are built in memory; OCR runs against fakes.

mod common;

use common::*;
use folio_core::converter::{
    save_pages, ContentShape, DocumentSource, PdfConverter, PdfDocument, PdfImageConverter,
    PDF_CHUNK_SIZE,
};
use folio_core::index::{ensure_collection, IndexRecord, SearchParams};
use folio_core::*;
use std::sync::Arc;

fn factory(rasterizer: Arc<FakeRasterizer>, ocr: Arc<FakeOcr>) -> ConverterFactory {
    ConverterFactory::new(reqwest::Client::new(), rasterizer, ocr)
}

fn page_numbers(pages: &[PageRecord]) -> Vec<u32> {
    pages.iter().map(|p| p.page_number).collect()
}

// ============================================================================
// Detection
// ============================================================================

#[tokio::test]
async fn test_text_pdf_detected_as_text() {
    let bytes = text_pdf(2, Some("Field Manual"));
    let source = DocumentSource::with_content("/archive/manual.pdf", bytes);
    let converter = PdfConverter::create(
        source,
        &reqwest::Client::new(),
        "eng",
        Arc::new(FakeRasterizer::default()),
        Arc::new(FakeOcr::default()),
    )
    .await
    .unwrap();
    assert_eq!(converter.shape(), ContentShape::Text);
}

#[tokio::test]
async fn test_short_first_page_detected_as_image() {
    // under 100 characters of text on page 1
    let bytes = build_pdf(&["Cover".to_string(), "x".repeat(300)], None);
    let source = DocumentSource::with_content("cover.pdf", bytes);
    let converter = PdfConverter::create(
        source,
        &reqwest::Client::new(),
        "eng",
        Arc::new(FakeRasterizer::default()),
        Arc::new(FakeOcr::default()),
    )
    .await
    .unwrap();
    assert_eq!(converter.shape(), ContentShape::Image);
}

#[tokio::test]
async fn test_pdf_without_pages_fails_detection() {
    let bytes = build_pdf(&[], None);
    assert_eq!(PdfDocument::parse(&bytes).unwrap().page_count(), 0);

    let result = factory(Arc::default(), Arc::default())
        .create(DocumentSource::with_content("empty.pdf", bytes), "pdf", "eng")
        .await;
    assert!(matches!(result, Err(FolioError::Conversion(_))));
}

#[tokio::test]
async fn test_garbage_pdf_fails() {
    let result = factory(Arc::default(), Arc::default())
        .create(
            DocumentSource::with_content("broken.pdf", b"%PDF-1.4 nothing else".to_vec()),
            "pdf",
            "eng",
        )
        .await;
    assert!(result.is_err());
}

// ============================================================================
// Text variant
// ============================================================================

#[tokio::test]
async fn test_text_pdf_pages_and_title() {
    let rasterizer = Arc::new(FakeRasterizer::default());
    let bytes = text_pdf(3, Some("Field Manual"));
    let source = DocumentSource::with_content("/archive/manual.pdf", bytes);
    let mut converter = factory(rasterizer.clone(), Arc::default())
        .create_for_name(source, "manual.pdf", "eng")
        .await
        .unwrap();

    let pages = converter.collect_pages().await.unwrap();
    assert_eq!(page_numbers(&pages), vec![1, 2, 3, 4]);
    assert!(pages.iter().all(|p| p.book_name == "Field Manual"));
    assert!(pages.iter().all(|p| p.file_path == "/archive/manual.pdf"));
    assert!(pages[0].page_content.contains("Intelligence summary"));
    assert!(pages[3].page_content.contains("Appendix page 4"));
    // the text path never rasterizes
    assert!(rasterizer.calls.lock().is_empty());
}

#[tokio::test]
async fn test_text_pdf_title_falls_back_to_first_line() {
    let bytes = text_pdf(0, None);
    let mut converter = factory(Arc::default(), Arc::default())
        .create(DocumentSource::with_content("untitled.pdf", bytes), "PDF", "eng")
        .await
        .unwrap();

    let pages = converter.collect_pages().await.unwrap();
    assert_eq!(pages.len(), 1);
    assert!(pages[0].book_name.starts_with("Intelligence summary"));
}

// ============================================================================
// Image variant
// ============================================================================

#[tokio::test]
async fn test_image_pdf_numbers_pages_across_chunks() {
    let rasterizer = Arc::new(FakeRasterizer::default());
    let ocr = Arc::new(FakeOcr::default());
    let mut converter = factory(rasterizer.clone(), ocr.clone())
        .create(DocumentSource::with_content("/scans/box-7.pdf", image_pdf(45)), "pdf", "rus")
        .await
        .unwrap();

    let pages = converter.collect_pages().await.unwrap();
    assert_eq!(page_numbers(&pages), (1..=45).collect::<Vec<u32>>());
    for page in &pages {
        assert_eq!(page.page_content, format!("scanned page {}", page.page_number));
        // no metadata and no text: the file name is the title
        assert_eq!(page.book_name, "box-7.pdf");
    }

    assert_eq!(PDF_CHUNK_SIZE, 20);
    assert_eq!(*rasterizer.calls.lock(), vec![0..20, 20..40, 40..45]);
    assert!(ocr.languages.lock().iter().all(|lang| lang == "rus"));
}

#[tokio::test]
async fn test_image_converter_custom_chunk_size() {
    let rasterizer = Arc::new(FakeRasterizer::default());
    let converter = PdfImageConverter::create(
        DocumentSource::with_content("small.pdf", image_pdf(5)),
        &reqwest::Client::new(),
        "eng",
        rasterizer.clone(),
        Arc::new(FakeOcr::default()),
    )
    .await
    .unwrap();

    let mut converter = converter.with_chunk_size(2);
    let pages = converter.collect_pages().await.unwrap();
    assert_eq!(page_numbers(&pages), vec![1, 2, 3, 4, 5]);
    assert_eq!(*rasterizer.calls.lock(), vec![0..2, 2..4, 4..5]);
}

// ============================================================================
// Word variant and dispatch
// ============================================================================

#[tokio::test]
async fn test_word_document_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memo.docx");
    std::fs::write(&path, build_docx(&["a".repeat(3349), "b".repeat(3349)])).unwrap();
    let path = path.to_string_lossy().to_string();

    let mut converter = factory(Arc::default(), Arc::default())
        .create_for_name(DocumentSource::new(path.clone()), "memo.docx", "eng")
        .await
        .unwrap();
    let pages = converter.collect_pages().await.unwrap();

    assert_eq!(page_numbers(&pages), vec![1, 2]);
    assert!(pages.iter().all(|p| p.book_name == path));
    assert_eq!(pages[0].page_content, "a".repeat(3349));
}

#[tokio::test]
async fn test_legacy_doc_is_rejected() {
    let result = factory(Arc::default(), Arc::default())
        .create(
            DocumentSource::with_content("old.doc", b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1".to_vec()),
            "doc",
            "eng",
        )
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_unsupported_extension() {
    let source = DocumentSource::with_content("notes.txt", b"hi".to_vec());
    let result = factory(Arc::default(), Arc::default())
        .create_for_name(source, "notes.txt", "eng")
        .await;
    assert!(matches!(result, Err(FolioError::UnsupportedFormat(ext)) if ext == "txt"));
}

// ============================================================================
// Persistence
// ============================================================================

#[tokio::test]
async fn test_saved_pages_round_trip_through_index() {
    let index = MemoryIndex::new();
    ensure_collection::<PageRecord>(&index, "books").await.unwrap();

    let mut converter = factory(Arc::default(), Arc::default())
        .create(DocumentSource::with_content("/m.pdf", text_pdf(2, Some("M"))), "pdf", "eng")
        .await
        .unwrap();
    let saved = save_pages(&index, "books", converter.as_mut()).await.unwrap();
    assert_eq!(saved, 3);

    let expected = converter.collect_pages().await.unwrap();
    let mut stored = index
        .search(
            "books",
            &SearchParams::all().query_by(["page_content"]).per_page(50),
        )
        .await
        .unwrap()
        .records::<PageRecord>()
        .unwrap();
    stored.sort_by_key(|p| p.page_number);
    assert_eq!(stored, expected);
}

#[tokio::test]
async fn test_save_pages_into_missing_collection_fails() {
    let index = MemoryIndex::new();
    let mut converter = factory(Arc::default(), Arc::default())
        .create(DocumentSource::with_content("/m.pdf", text_pdf(0, None)), "pdf", "eng")
        .await
        .unwrap();
    assert!(save_pages(&index, "nowhere", converter.as_mut()).await.is_err());
    // schema of the page collection
    assert_eq!(
        PageRecord::schema("nowhere").default_sorting_field.as_deref(),
        Some("page_number")
    );
}
