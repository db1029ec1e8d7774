//! Word (.docx) converter
//!
//! A .docx file is a zip archive whose `word/document.xml` holds the body.
//! The format has no page boundaries, so pages are synthetic: paragraphs
//! accumulate until `WORD_CHARS_PER_PAGE` characters, then flush.

use super::{Converter, DocumentSource, WORD_CHARS_PER_PAGE};
use crate::error::{FolioError, Result};
use crate::models::PageRecord;
use async_trait::async_trait;
use regex::Regex;
use std::io::{Cursor, Read};
use std::sync::OnceLock;
use tracing::debug;

const DOCUMENT_PART: &str = "word/document.xml";

fn paragraph_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // <w:p> with or without attributes, or the empty <w:p/>; <w:pPr> etc. do not match
    RE.get_or_init(|| {
        Regex::new(r"(?s)<w:p(?:\s[^>]*)?/>|<w:p(?:\s[^>]*)?>(.*?)</w:p>").expect("valid regex")
    })
}

fn run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>|<w:tab/>|<w:br(?:\s[^>]*)?/>")
            .expect("valid regex")
    })
}

/// Resolve the five predefined XML entities and numeric references
fn unescape_xml(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let Some(end) = rest.find(';') else { break };
        let entity = &rest[1..end];
        let decoded = match entity {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Plain text of every paragraph in `word/document.xml`, in document order
pub fn read_paragraphs(bytes: &[u8]) -> Result<Vec<String>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_PART)
        .map_err(|e| {
            FolioError::Conversion(format!("Not a Word document ({}): {}", DOCUMENT_PART, e))
        })?
        .read_to_string(&mut xml)?;

    let paragraphs = paragraph_regex()
        .captures_iter(&xml)
        .map(|para| {
            let body = para.get(1).map_or("", |m| m.as_str());
            run_regex()
                .captures_iter(body)
                .map(|run| match run.get(1) {
                    Some(text) => unescape_xml(text.as_str()),
                    None if run[0].starts_with("<w:tab") => "\t".to_string(),
                    None => "\n".to_string(),
                })
                .collect::<String>()
        })
        .collect();
    Ok(paragraphs)
}

/// Group paragraphs into pages of at least `chars_per_page` characters;
/// the remainder becomes a final, shorter page
pub fn paginate(
    file_path: &str,
    book_name: &str,
    paragraphs: &[String],
    chars_per_page: usize,
) -> Vec<PageRecord> {
    let mut pages = Vec::new();
    let mut current = String::new();
    let mut char_count = 0;

    let flush = |text: &str, pages: &mut Vec<PageRecord>| {
        pages.push(PageRecord {
            file_path: file_path.to_string(),
            book_name: book_name.to_string(),
            page_number: pages.len() as u32 + 1,
            page_content: text.trim().to_string(),
        });
    };

    for paragraph in paragraphs {
        current.push_str(paragraph);
        current.push('\n');
        char_count += paragraph.chars().count() + 1;

        if char_count >= chars_per_page {
            flush(&current, &mut pages);
            current.clear();
            char_count = 0;
        }
    }

    if !current.trim().is_empty() {
        flush(&current, &mut pages);
    }
    pages
}

/// Converter for .docx documents
pub struct WordConverter {
    source: DocumentSource,
    paragraphs: Vec<String>,
    chars_per_page: usize,
}

impl WordConverter {
    pub async fn create(mut source: DocumentSource, http: &reqwest::Client) -> Result<Self> {
        source.load_content(http).await?;
        let bytes = source.content()?;
        let paragraphs = tokio::task::spawn_blocking(move || read_paragraphs(&bytes)).await??;
        debug!("Read {} paragraphs from {}", paragraphs.len(), source.file_path);
        Ok(Self {
            source,
            paragraphs,
            chars_per_page: WORD_CHARS_PER_PAGE,
        })
    }
}

#[async_trait]
impl Converter for WordConverter {
    fn file_path(&self) -> &str {
        &self.source.file_path
    }

    async fn collect_pages(&mut self) -> Result<Vec<PageRecord>> {
        // no embedded title is available, the path stands in for it
        let book_name = self.source.file_path.clone();
        Ok(paginate(
            &self.source.file_path,
            &book_name,
            &self.paragraphs,
            self.chars_per_page,
        ))
    }
}
