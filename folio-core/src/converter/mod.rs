//! Document converter framework
//!
//! A converter owns the raw bytes of one document (loaded on demand from
//! disk or over HTTP) plus its parsed form, and turns them into
//! `PageRecord`s. PDFs go through a content-type detector that picks the
//! text or OCR variant; Word documents get synthetic pagination.

use crate::error::{FolioError, Result};
use crate::index::{import_records, SearchIndex};
use crate::models::{DocumentFormat, PageRecord};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

pub mod ocr;
pub mod pdf;
pub mod word;

pub use ocr::{OcrEngine, PageRasterizer, PdfiumRasterizer, TesseractOcr};
pub use pdf::{ContentShape, PdfConverter, PdfDocument, PdfImageConverter, PdfTextConverter};
pub use word::WordConverter;

/// PDF pages rasterized and OCR'd per chunk
pub const PDF_CHUNK_SIZE: usize = 20;

/// Minimum stripped first-page text length for a PDF to count as text
pub const TEXT_THRESHOLD: usize = 100;

/// Characters accumulated before a Word page is flushed
pub const WORD_CHARS_PER_PAGE: usize = 3300;

/// Raw bytes of one document, fetched lazily
#[derive(Debug, Clone)]
pub struct DocumentSource {
    /// Owning document identifier, copied into every page
    pub file_path: String,
    /// Base name of the path, used as the last-resort title
    pub file_name: String,
    content: Option<Arc<Vec<u8>>>,
}

impl DocumentSource {
    /// A source whose bytes will be read from `file_path` on load
    pub fn new(file_path: impl Into<String>) -> Self {
        let file_path = file_path.into();
        Self {
            file_name: base_name(&file_path),
            file_path,
            content: None,
        }
    }

    /// A source whose bytes are already in hand
    pub fn with_content(file_path: impl Into<String>, content: Vec<u8>) -> Self {
        let mut source = Self::new(file_path);
        source.content = Some(Arc::new(content));
        source
    }

    pub fn is_loaded(&self) -> bool {
        self.content.is_some()
    }

    /// Download or read the bytes unless they are already present
    pub async fn load_content(&mut self, http: &reqwest::Client) -> Result<()> {
        if self.is_loaded() {
            return Ok(());
        }

        let bytes = if is_url(&self.file_path) {
            debug!("Downloading {}", self.file_path);
            let response = http.get(&self.file_path).send().await?.error_for_status()?;
            response.bytes().await?.to_vec()
        } else {
            debug!("Reading {}", self.file_path);
            tokio::fs::read(&self.file_path).await?
        };

        info!("Loaded {} bytes from {}", bytes.len(), self.file_path);
        self.file_name = base_name(&self.file_path);
        self.content = Some(Arc::new(bytes));
        Ok(())
    }

    /// Loaded bytes, shared without copying
    pub fn content(&self) -> Result<Arc<Vec<u8>>> {
        self.content
            .clone()
            .ok_or_else(|| {
                FolioError::Conversion(format!("{} has not been loaded", self.file_path))
            })
    }
}

pub fn is_url(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}

/// Last path segment; query strings and fragments are dropped for URLs
pub fn base_name(path: &str) -> String {
    let path = if is_url(path) {
        path.split(['?', '#']).next().unwrap_or(path)
    } else {
        path
    };
    path.trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Extracts page records from one document
#[async_trait]
pub trait Converter: Send {
    /// Identifier written into every produced page
    fn file_path(&self) -> &str;

    async fn collect_pages(&mut self) -> Result<Vec<PageRecord>>;
}

/// Builds converters by file format
#[derive(Clone)]
pub struct ConverterFactory {
    http: reqwest::Client,
    rasterizer: Arc<dyn PageRasterizer>,
    ocr: Arc<dyn OcrEngine>,
}

impl ConverterFactory {
    pub fn new(
        http: reqwest::Client,
        rasterizer: Arc<dyn PageRasterizer>,
        ocr: Arc<dyn OcrEngine>,
    ) -> Self {
        Self { http, rasterizer, ocr }
    }

    /// Pdfium rasterization and the `tesseract` binary from `PATH`
    pub fn with_defaults(http: reqwest::Client) -> Self {
        Self::new(
            http,
            Arc::new(PdfiumRasterizer::default()),
            Arc::new(TesseractOcr::default()),
        )
    }

    /// Create and load a converter for a file extension
    ///
    /// Unknown extensions fail before anything is loaded.
    pub async fn create(
        &self,
        source: DocumentSource,
        extension: &str,
        language: &str,
    ) -> Result<Box<dyn Converter>> {
        let format = DocumentFormat::from_extension(extension)?;
        info!("Creating {:?} converter for {}", format, source.file_path);

        let converter: Box<dyn Converter> = match format {
            DocumentFormat::Pdf => Box::new(
                PdfConverter::create(
                    source,
                    &self.http,
                    language,
                    self.rasterizer.clone(),
                    self.ocr.clone(),
                )
                .await?,
            ),
            DocumentFormat::Word => Box::new(WordConverter::create(source, &self.http).await?),
        };
        Ok(converter)
    }

    /// Like [`create`](Self::create), taking the extension from a file name
    pub async fn create_for_name(
        &self,
        source: DocumentSource,
        file_name: &str,
        language: &str,
    ) -> Result<Box<dyn Converter>> {
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .ok_or_else(|| FolioError::UnsupportedFormat(file_name.to_string()))?;
        self.create(source, extension, language).await
    }
}

/// Collect a converter's pages and bulk-import them into the project collection
pub async fn save_pages(
    index: &dyn SearchIndex,
    project_name: &str,
    converter: &mut dyn Converter,
) -> Result<usize> {
    let pages = converter.collect_pages().await?;
    info!(
        "Collected {} pages from {}, importing into {}",
        pages.len(),
        converter.file_path(),
        project_name
    );
    import_records(index, project_name, &pages).await
}
