//! Rasterization and OCR backends for scanned PDFs
//!
//! Both traits are synchronous: callers run them on the blocking pool.

use crate::error::{FolioError, Result};
use image::{DynamicImage, ImageFormat, RgbaImage};
use pdfium_render::prelude::*;
use std::io::{Cursor, Write};
use std::ops::Range;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::debug;

/// Renders a range of PDF pages (0-based) into images
pub trait PageRasterizer: Send + Sync {
    fn rasterize(&self, pdf: &[u8], pages: Range<usize>) -> Result<Vec<DynamicImage>>;
}

/// Recognizes text in an image for a language code such as `eng`
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &DynamicImage, language: &str) -> Result<String>;
}

/// Pdfium-backed rasterizer
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    /// Directory holding the pdfium shared library; system search path if unset
    pub library_dir: Option<PathBuf>,
    /// Rendered page width in pixels (~200 dpi for A4)
    pub target_width: i32,
}

impl Default for PdfiumRasterizer {
    fn default() -> Self {
        Self {
            library_dir: None,
            target_width: 1700,
        }
    }
}

impl PdfiumRasterizer {
    fn bind(&self) -> Result<Pdfium> {
        let bindings = match &self.library_dir {
            Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| FolioError::Ocr(format!("Failed to load pdfium: {}", e)))?;
        Ok(Pdfium::new(bindings))
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn rasterize(&self, pdf: &[u8], pages: Range<usize>) -> Result<Vec<DynamicImage>> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| FolioError::Ocr(format!("Failed to open PDF: {}", e)))?;
        let render_config = PdfRenderConfig::new().set_target_width(self.target_width);

        let mut images = Vec::with_capacity(pages.len());
        for index in pages {
            let page = document
                .pages()
                .get(index as u16)
                .map_err(|e| FolioError::Ocr(format!("Page {} unavailable: {}", index + 1, e)))?;
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                FolioError::Ocr(format!("Failed to render page {}: {}", index + 1, e))
            })?;
            let rgba = RgbaImage::from_raw(
                bitmap.width() as u32,
                bitmap.height() as u32,
                bitmap.as_rgba_bytes(),
            )
            .ok_or_else(|| FolioError::Ocr(format!("Bad bitmap for page {}", index + 1)))?;
            debug!("Rendered page {} at {}x{}", index + 1, rgba.width(), rgba.height());
            images.push(DynamicImage::ImageRgba8(rgba));
        }
        Ok(images)
    }
}

/// OCR through the `tesseract` command-line tool
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    pub binary: PathBuf,
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
        }
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, image: &DynamicImage, language: &str) -> Result<String> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| FolioError::Ocr(format!("Failed to encode page image: {}", e)))?;

        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "-l", language])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| FolioError::Ocr(format!("Failed to start {:?}: {}", self.binary, e)))?;

        // tesseract reads the whole image before writing anything; a failed
        // write still has to reap the child and surface its stderr
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(&png),
            None => Ok(()),
        };
        let output = child.wait_with_output()?;

        if !output.status.success() {
            return Err(FolioError::Ocr(format!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        if let Err(e) = written {
            return Err(FolioError::Ocr(format!("Failed to send page image to tesseract: {}", e)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
