//! Shared fixtures: in-memory PDFs and .docx files, and fake Drive/OCR backends

#![allow(dead_code)]

use async_trait::async_trait;
use folio_core::converter::{OcrEngine, PageRasterizer};
use folio_core::sources::{DriveApi, DriveFile};
use folio_core::{FolioError, Result};
use image::DynamicImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::ops::Range;

/// A PDF with one page per entry; empty entries become pages without text
pub fn build_pdf(pages: &[String], title: Option<&str>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let operations = if text.is_empty() {
            Vec::new()
        } else {
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 10.into()]),
                Operation::new("Td", vec![20.into(), 800.into()]),
                Operation::new("Tj", vec![Object::string_literal(text.as_str())]),
                Operation::new("ET", vec![]),
            ]
        };
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    if let Some(title) = title {
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal(title),
        });
        doc.trailer.set("Info", info_id);
    }

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// A text PDF: a long first page followed by `extra_pages` short ones
pub fn text_pdf(extra_pages: usize, title: Option<&str>) -> Vec<u8> {
    let mut pages = vec!["Intelligence summary ".repeat(8)];
    pages.extend((0..extra_pages).map(|i| format!("Appendix page {}", i + 2)));
    build_pdf(&pages, title)
}

/// A scanned-looking PDF: `count` pages without any text layer
pub fn image_pdf(count: usize) -> Vec<u8> {
    build_pdf(&vec![String::new(); count], None)
}

/// A minimal .docx whose body holds one `<w:p>` per paragraph
pub fn build_docx(paragraphs: &[String]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>", p))
        .collect();

    let mut buffer = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buffer);
        writer
            .start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        write!(
            writer,
            r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
            body
        )
        .unwrap();
        writer.finish().unwrap();
    }
    buffer.into_inner()
}

/// Rasterizer that encodes the 0-based page index in the image width
#[derive(Default)]
pub struct FakeRasterizer {
    pub calls: Mutex<Vec<Range<usize>>>,
}

impl PageRasterizer for FakeRasterizer {
    fn rasterize(&self, _pdf: &[u8], pages: Range<usize>) -> Result<Vec<DynamicImage>> {
        self.calls.lock().push(pages.clone());
        Ok(pages
            .map(|index| DynamicImage::new_luma8(index as u32 + 1, 1))
            .collect())
    }
}

/// OCR that reads back the page encoded by `FakeRasterizer`
#[derive(Default)]
pub struct FakeOcr {
    pub languages: Mutex<Vec<String>>,
}

impl OcrEngine for FakeOcr {
    fn recognize(&self, image: &DynamicImage, language: &str) -> Result<String> {
        self.languages.lock().push(language.to_string());
        Ok(format!("scanned page {}", image.width()))
    }
}

/// Drive tree held in memory; downloading `boom` panics
#[derive(Default)]
pub struct FakeDrive {
    files: HashMap<String, DriveFile>,
    children: HashMap<String, Vec<String>>,
    contents: HashMap<String, Vec<u8>>,
    pub listed: Mutex<Vec<String>>,
}

pub const FOLDER: &str = "application/vnd.google-apps.folder";

impl FakeDrive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn folder(mut self, parent: Option<&str>, id: &str, name: &str) -> Self {
        self.add(parent, id, name, FOLDER);
        self
    }

    pub fn file(mut self, parent: Option<&str>, id: &str, name: &str, content: Vec<u8>) -> Self {
        self.add(parent, id, name, "application/octet-stream");
        self.contents.insert(id.to_string(), content);
        self
    }

    fn add(&mut self, parent: Option<&str>, id: &str, name: &str, mime_type: &str) {
        self.files.insert(
            id.to_string(),
            DriveFile {
                id: id.to_string(),
                name: name.to_string(),
                mime_type: mime_type.to_string(),
            },
        );
        if let Some(parent) = parent {
            self.children
                .entry(parent.to_string())
                .or_default()
                .push(id.to_string());
        }
    }
}

#[async_trait]
impl DriveApi for FakeDrive {
    async fn file_metadata(&self, file_id: &str) -> Result<DriveFile> {
        self.files
            .get(file_id)
            .cloned()
            .ok_or_else(|| FolioError::NotFound(format!("Drive file {}", file_id)))
    }

    async fn list_children(&self, folder_id: &str) -> Result<Vec<DriveFile>> {
        self.listed.lock().push(folder_id.to_string());
        Ok(self
            .children
            .get(folder_id)
            .map(|ids| ids.iter().filter_map(|id| self.files.get(id).cloned()).collect())
            .unwrap_or_default())
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        if file_id == "boom" {
            panic!("simulated crash while downloading");
        }
        self.contents
            .get(file_id)
            .cloned()
            .ok_or_else(|| FolioError::NotFound(format!("Drive file {}", file_id)))
    }
}
