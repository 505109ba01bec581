use lopdf::{Document, Object};
use time::{Date, Month};
use tracing::debug;

use crate::IngestError;

/// Per-page text of a document plus its creation date, when recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextDocument {
    pub pages: Vec<String>,
    pub created_on: Option<Date>,
}

impl TextDocument {
    /// True when no page carries any non-whitespace text, as with scans.
    pub fn is_blank(&self) -> bool {
        self.pages.iter().all(|page| page.trim().is_empty())
    }
}

/// Reads the embedded text layer of a PDF.
pub trait TextLayerReader: Send + Sync {
    /// Extracts at most `max_pages` leading pages. Fails with
    /// [`IngestError::MalformedDocument`] when the container cannot be opened.
    fn read(&self, bytes: &[u8], max_pages: usize) -> Result<TextDocument, IngestError>;
}

/// Pure-Rust text layer reader.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfReader;

impl LopdfReader {
    fn load(bytes: &[u8]) -> Result<Document, IngestError> {
        Document::load_mem(bytes).map_err(|e| IngestError::MalformedDocument(e.to_string()))
    }
}

impl TextLayerReader for LopdfReader {
    fn read(&self, bytes: &[u8], max_pages: usize) -> Result<TextDocument, IngestError> {
        let document = Self::load(bytes)?;
        let mut pages = Vec::new();
        for page_number in document.get_pages().into_keys().take(max_pages) {
            let text = document
                .extract_text(&[page_number])
                .map_err(|e| IngestError::MalformedDocument(format!("page {page_number}: {e}")))?;
            pages.push(text);
        }
        let created_on = creation_date(&document);
        debug!(pages = pages.len(), ?created_on, "read text layer");
        Ok(TextDocument { pages, created_on })
    }
}

fn creation_date(document: &Document) -> Option<Date> {
    let info = match document.trailer.get(b"Info").ok()? {
        Object::Reference(id) => document.get_dictionary(*id).ok()?,
        Object::Dictionary(dictionary) => dictionary,
        _ => return None,
    };
    let raw = info.get(b"CreationDate").ok()?.as_str().ok()?;
    parse_pdf_date(&String::from_utf8_lossy(raw))
}

/// Calendar part of a PDF date string, `D:YYYYMMDDHHmmSSOHH'mm'`.
pub fn parse_pdf_date(raw: &str) -> Option<Date> {
    let digits = raw.trim().trim_start_matches("D:");
    let year: i32 = digits.get(0..4)?.parse().ok()?;
    // Month and day default to 01 when omitted.
    let month: u8 = digits.get(4..6).map_or(Some(1), |m| m.parse().ok())?;
    let day: u8 = digits.get(6..8).map_or(Some(1), |d| d.parse().ok())?;
    Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()
}
