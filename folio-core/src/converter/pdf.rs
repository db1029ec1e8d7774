//! PDF converters
//!
//! `PdfConverter` parses the document once, looks at the first page and
//! hands the parsed document to either the text variant (embedded text per
//! page) or the image variant (rasterize + OCR in fixed-size chunks).

use super::{Converter, DocumentSource, OcrEngine, PageRasterizer, PDF_CHUNK_SIZE, TEXT_THRESHOLD};
use crate::error::{FolioError, Result};
use crate::models::PageRecord;
use async_trait::async_trait;
use lopdf::{Document, Object};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Parsed PDF with its page numbers in order
pub struct PdfDocument {
    document: Document,
    page_numbers: Vec<u32>,
}

impl PdfDocument {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let document = Document::load_mem(bytes)?;
        // get_pages is keyed by 1-based page number, already ordered
        let page_numbers = document.get_pages().keys().copied().collect();
        Ok(Self {
            document,
            page_numbers,
        })
    }

    pub fn page_count(&self) -> usize {
        self.page_numbers.len()
    }

    /// Extracted text of the page at `index` (0-based); empty when the page
    /// has no extractable text
    pub fn page_text(&self, index: usize) -> String {
        let Some(&number) = self.page_numbers.get(index) else {
            return String::new();
        };
        match self.document.extract_text(&[number]) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to extract text from page {}: {}", number, e);
                String::new()
            }
        }
    }

    /// `Title` entry of the document information dictionary
    pub fn metadata_title(&self) -> Option<String> {
        let info = match self.document.trailer.get(b"Info").ok()? {
            Object::Reference(id) => self.document.get_object(*id).ok()?,
            other => other,
        };
        let title = info.as_dict().ok()?.get(b"Title").ok()?;
        let title = match title {
            Object::Reference(id) => self.document.get_object(*id).ok()?,
            other => other,
        };
        match title {
            Object::String(bytes, _) => {
                let decoded = decode_pdf_string(bytes);
                let trimmed = decoded.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            _ => None,
        }
    }

    /// Metadata title, else the first non-empty line of page 1
    pub fn title(&self) -> Option<String> {
        self.metadata_title().or_else(|| {
            self.page_text(0)
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(String::from)
        })
    }
}

/// Decode a PDF text string: UTF-16BE with BOM, UTF-8, or Latin-1
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// How a PDF's content is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentShape {
    /// Embedded text layer
    Text,
    /// Scanned images that need OCR
    Image,
}

/// Classify a PDF by the amount of text on its first page
pub fn detect_content_type(document: &PdfDocument, threshold: usize) -> Result<ContentShape> {
    if document.page_count() == 0 {
        return Err(FolioError::Conversion("PDF has not been loaded or is empty".into()));
    }
    let text = document.page_text(0);
    if text.trim().chars().count() >= threshold {
        Ok(ContentShape::Text)
    } else {
        Ok(ContentShape::Image)
    }
}

/// Bytes plus parsed document, shared by both variants
struct LoadedPdf {
    source: DocumentSource,
    document: Arc<PdfDocument>,
}

impl LoadedPdf {
    async fn load(mut source: DocumentSource, http: &reqwest::Client) -> Result<Self> {
        source.load_content(http).await?;
        let bytes = source.content()?;
        let document = tokio::task::spawn_blocking(move || PdfDocument::parse(&bytes)).await??;
        Ok(Self {
            source,
            document: Arc::new(document),
        })
    }

    async fn book_name(&self) -> Result<String> {
        let document = self.document.clone();
        let title = tokio::task::spawn_blocking(move || document.title()).await?;
        Ok(title.unwrap_or_else(|| self.source.file_name.clone()))
    }
}

/// One page record per PDF page from the embedded text layer
pub struct PdfTextConverter {
    pdf: LoadedPdf,
}

#[async_trait]
impl Converter for PdfTextConverter {
    fn file_path(&self) -> &str {
        &self.pdf.source.file_path
    }

    async fn collect_pages(&mut self) -> Result<Vec<PageRecord>> {
        let book_name = self.pdf.book_name().await?;
        let file_path = self.pdf.source.file_path.clone();
        let document = self.pdf.document.clone();

        let pages = tokio::task::spawn_blocking(move || {
            (0..document.page_count())
                .map(|index| PageRecord {
                    file_path: file_path.clone(),
                    book_name: book_name.clone(),
                    page_number: index as u32 + 1,
                    page_content: document.page_text(index),
                })
                .collect::<Vec<_>>()
        })
        .await?;

        debug!("Extracted {} text pages from {}", pages.len(), self.file_path());
        Ok(pages)
    }
}

/// OCR fallback for scanned PDFs, processed `PDF_CHUNK_SIZE` pages at a time
pub struct PdfImageConverter {
    pdf: LoadedPdf,
    language: String,
    rasterizer: Arc<dyn PageRasterizer>,
    ocr: Arc<dyn OcrEngine>,
    chunk_size: usize,
}

impl PdfImageConverter {
    pub async fn create(
        source: DocumentSource,
        http: &reqwest::Client,
        language: &str,
        rasterizer: Arc<dyn PageRasterizer>,
        ocr: Arc<dyn OcrEngine>,
    ) -> Result<Self> {
        let pdf = LoadedPdf::load(source, http).await?;
        Ok(Self::from_loaded(pdf, language, rasterizer, ocr))
    }

    fn from_loaded(
        pdf: LoadedPdf,
        language: &str,
        rasterizer: Arc<dyn PageRasterizer>,
        ocr: Arc<dyn OcrEngine>,
    ) -> Self {
        Self {
            pdf,
            language: language.to_string(),
            rasterizer,
            ocr,
            chunk_size: PDF_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

#[async_trait]
impl Converter for PdfImageConverter {
    fn file_path(&self) -> &str {
        &self.pdf.source.file_path
    }

    async fn collect_pages(&mut self) -> Result<Vec<PageRecord>> {
        let book_name = self.pdf.book_name().await?;
        let bytes = self.pdf.source.content()?;
        let total = self.pdf.document.page_count();
        let mut pages = Vec::with_capacity(total);

        for start in (0..total).step_by(self.chunk_size) {
            let range = start..(start + self.chunk_size).min(total);
            debug!("Rasterizing pages {}..{} of {}", range.start + 1, range.end, self.file_path());

            let rasterizer = self.rasterizer.clone();
            let chunk_bytes = bytes.clone();
            let chunk_range = range.clone();
            let images =
                tokio::task::spawn_blocking(move || rasterizer.rasterize(&chunk_bytes, chunk_range))
                    .await??;
            if images.len() != range.len() {
                return Err(FolioError::Ocr(format!(
                    "Rasterizer returned {} images for {} pages",
                    images.len(),
                    range.len()
                )));
            }

            for (offset, image) in images.into_iter().enumerate() {
                let ocr = self.ocr.clone();
                let language = self.language.clone();
                let text =
                    tokio::task::spawn_blocking(move || ocr.recognize(&image, &language)).await??;
                pages.push(PageRecord {
                    file_path: self.pdf.source.file_path.clone(),
                    book_name: book_name.clone(),
                    page_number: (range.start + offset) as u32 + 1,
                    page_content: text,
                });
            }
        }

        info!("OCR'd {} pages from {}", pages.len(), self.file_path());
        Ok(pages)
    }
}

/// Content-type detector in front of the two PDF variants
pub enum PdfConverter {
    Text(PdfTextConverter),
    Image(PdfImageConverter),
}

impl PdfConverter {
    /// Load and parse once, then pick the variant from the first page
    pub async fn create(
        source: DocumentSource,
        http: &reqwest::Client,
        language: &str,
        rasterizer: Arc<dyn PageRasterizer>,
        ocr: Arc<dyn OcrEngine>,
    ) -> Result<Self> {
        let pdf = LoadedPdf::load(source, http).await?;
        let document = pdf.document.clone();
        let shape =
            tokio::task::spawn_blocking(move || detect_content_type(&document, TEXT_THRESHOLD))
                .await??;

        info!("Detected {:?} PDF: {}", shape, pdf.source.file_path);
        Ok(match shape {
            ContentShape::Text => PdfConverter::Text(PdfTextConverter { pdf }),
            ContentShape::Image => {
                PdfConverter::Image(PdfImageConverter::from_loaded(pdf, language, rasterizer, ocr))
            }
        })
    }

    pub fn shape(&self) -> ContentShape {
        match self {
            PdfConverter::Text(_) => ContentShape::Text,
            PdfConverter::Image(_) => ContentShape::Image,
        }
    }
}

#[async_trait]
impl Converter for PdfConverter {
    fn file_path(&self) -> &str {
        match self {
            PdfConverter::Text(c) => c.file_path(),
            PdfConverter::Image(c) => c.file_path(),
        }
    }

    async fn collect_pages(&mut self) -> Result<Vec<PageRecord>> {
        match self {
            PdfConverter::Text(c) => c.collect_pages().await,
            PdfConverter::Image(c) => c.collect_pages().await,
        }
    }
}
