//! Content extraction with an ordered strategy chain.
//!
//! | Strategy | Input | Produces |
//! |----------|-------|----------|
//! | [`ExtractionStrategy::TextLayer`] | PDF with embedded text | per-page text, creation date |
//! | [`ExtractionStrategy::ImageVision`] | rasterized pages or scanned images | structured vision read |
//!
//! Strategies run in that order. Each attempt is tagged [`Attempt::Success`],
//! [`Attempt::Retryable`] (hand over to the next strategy) or
//! [`Attempt::Fatal`] (stop; the document cannot be ingested).

pub mod raster;
pub mod text_layer;
pub mod vision;

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use serde::Serialize;
use time::Date;
use tracing::{debug, info, warn};

use crate::datetime::DateTimeResolver;
use crate::sniff::DocumentKind;
use crate::table::{ParsedTable, RateTableParser};
use crate::{IngestError, PublishedAt};

pub use raster::{PageRasterizer, PdftoppmRasterizer, RasterFuture, DEFAULT_DPI};
pub use text_layer::{parse_pdf_date, LopdfReader, TextDocument, TextLayerReader};
pub use vision::{
    OpenAiVisionReader, VisionConfig, VisionFuture, VisionRate, VisionRead, VisionReader, VisionRow,
};

/// Leading pages read from the text layer; the timestamp and the rate table
/// sit on the first two pages of this document family.
pub const DEFAULT_MAX_PAGES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    TextLayer,
    ImageVision,
}

impl Display for ExtractionStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TextLayer => f.write_str("text layer"),
            Self::ImageVision => f.write_str("image vision"),
        }
    }
}

/// Tagged outcome of one strategy.
#[derive(Debug)]
pub enum Attempt<T> {
    Success(T),
    Retryable(IngestError),
    Fatal(IngestError),
}

/// Timestamp and rows of one document.
#[derive(Debug, Clone)]
pub struct ExtractedTable {
    pub published_at: PublishedAt,
    pub table: ParsedTable,
    pub strategy: ExtractionStrategy,
}

/// Vision collaborators; both are needed for the image path.
#[derive(Clone)]
pub struct VisionPath {
    pub rasterizer: Arc<dyn PageRasterizer>,
    pub reader: Arc<dyn VisionReader>,
}

/// Turns document bytes into a timestamped rate table.
#[derive(Clone)]
pub struct ContentExtractor {
    text_reader: Arc<dyn TextLayerReader>,
    vision: Option<VisionPath>,
    resolver: DateTimeResolver,
    parser: RateTableParser,
    max_pages: usize,
}

impl Default for ContentExtractor {
    fn default() -> Self {
        Self::new(Arc::new(LopdfReader))
    }
}

impl ContentExtractor {
    pub fn new(text_reader: Arc<dyn TextLayerReader>) -> Self {
        Self {
            text_reader,
            vision: None,
            resolver: DateTimeResolver::new(),
            parser: RateTableParser::new(),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_vision(
        mut self,
        rasterizer: Arc<dyn PageRasterizer>,
        reader: Arc<dyn VisionReader>,
    ) -> Self {
        self.vision = Some(VisionPath { rasterizer, reader });
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Per-page text of the leading pages.
    pub fn extract_text(&self, bytes: &[u8]) -> Result<TextDocument, IngestError> {
        self.text_reader.read(bytes, self.max_pages)
    }

    /// Structured read of the first page that confirms the rate table.
    pub async fn extract_via_image(
        &self,
        bytes: &[u8],
        kind: DocumentKind,
    ) -> Result<VisionRead, IngestError> {
        let vision = self.vision.as_ref().ok_or_else(|| {
            IngestError::ExtractionFailed(String::from("no vision reader configured"))
        })?;

        let (pages, mime_type) = match kind {
            DocumentKind::Pdf => (vision.rasterizer.rasterize(bytes).await?, "image/png"),
            image => (vec![bytes.to_vec()], image.mime_type()),
        };

        let mut last_error = None;
        for (index, page) in pages.iter().enumerate() {
            match vision.reader.read_page(page, mime_type).await {
                Ok(read) if read.is_rate_table => {
                    info!(page = index + 1, rows = read.rows.len(), "vision read confirmed rate table");
                    return Ok(read);
                }
                Ok(_) => debug!(page = index + 1, "vision read found no rate table"),
                Err(error) => {
                    warn!(page = index + 1, %error, "vision read failed");
                    last_error = Some(error);
                }
            }
        }

        let detail = last_error.map_or_else(String::new, |error| format!("; last error: {error}"));
        Err(IngestError::ExtractionFailed(format!(
            "no page of {} confirmed a rate table{detail}",
            pages.len()
        )))
    }

    /// Runs the strategy chain over `bytes`.
    pub async fn extract(&self, bytes: &[u8]) -> Result<ExtractedTable, IngestError> {
        let kind = DocumentKind::sniff(bytes).ok_or_else(|| {
            IngestError::ExtractionFailed(String::from("payload is neither a PDF nor a PNG/JPEG image"))
        })?;

        let mut strategies = Vec::with_capacity(2);
        if kind == DocumentKind::Pdf {
            strategies.push(ExtractionStrategy::TextLayer);
        }
        if self.vision.is_some() {
            strategies.push(ExtractionStrategy::ImageVision);
        }

        let mut created_on = None;
        let mut last_error = None;
        for strategy in strategies {
            let attempt = match strategy {
                ExtractionStrategy::TextLayer => self.try_text_layer(bytes, &mut created_on),
                ExtractionStrategy::ImageVision => self.try_image_vision(bytes, kind, created_on).await,
            };
            match attempt {
                Attempt::Success(extracted) => {
                    info!(
                        %strategy,
                        published_at = %extracted.published_at,
                        rows = extracted.table.rows.len(),
                        "extracted rate table"
                    );
                    return Ok(extracted);
                }
                Attempt::Fatal(error) => {
                    warn!(%strategy, %error, "extraction failed");
                    return Err(error);
                }
                Attempt::Retryable(error) => {
                    warn!(%strategy, %error, "strategy yielded nothing usable, falling back");
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            IngestError::ExtractionFailed(format!(
                "{} documents need a vision reader",
                kind.mime_type()
            ))
        }))
    }

    fn try_text_layer(
        &self,
        bytes: &[u8],
        created_on: &mut Option<Date>,
    ) -> Attempt<ExtractedTable> {
        let document = match self.extract_text(bytes) {
            Ok(document) => document,
            Err(error) => return Attempt::Retryable(error),
        };
        *created_on = document.created_on;
        if document.is_blank() {
            return Attempt::Retryable(IngestError::ExtractionFailed(String::from(
                "document has no text layer",
            )));
        }

        let published_at = match self.resolver.resolve_pages(&document.pages, document.created_on) {
            Ok(published_at) => published_at,
            Err(error) if error.is_fatal() => return Attempt::Fatal(error.into()),
            Err(error) => return Attempt::Retryable(error.into()),
        };
        match self.parser.parse_pages(&document.pages) {
            Ok(table) => Attempt::Success(ExtractedTable {
                published_at,
                table,
                strategy: ExtractionStrategy::TextLayer,
            }),
            Err(error) => Attempt::Retryable(error.into()),
        }
    }

    async fn try_image_vision(
        &self,
        bytes: &[u8],
        kind: DocumentKind,
        created_on: Option<Date>,
    ) -> Attempt<ExtractedTable> {
        let read = match self.extract_via_image(bytes, kind).await {
            Ok(read) => read,
            Err(error) => return Attempt::Fatal(error),
        };

        let (Some(date_text), Some(time_text)) = (read.date_text.as_deref(), read.time_text.as_deref())
        else {
            return Attempt::Fatal(IngestError::DateTimeExtraction(String::from(
                "vision read carries no date or time",
            )));
        };
        let published_at = match self.resolver.resolve_parts(date_text, time_text, created_on) {
            Ok(published_at) => published_at,
            Err(error) => return Attempt::Fatal(error.into()),
        };
        match read.table() {
            Ok(table) => Attempt::Success(ExtractedTable {
                published_at,
                table,
                strategy: ExtractionStrategy::ImageVision,
            }),
            Err(error) => Attempt::Fatal(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use time::macros::date;

    use super::*;

    struct FixedText(Result<TextDocument, String>);

    impl TextLayerReader for FixedText {
        fn read(&self, _bytes: &[u8], max_pages: usize) -> Result<TextDocument, IngestError> {
            match &self.0 {
                Ok(document) => Ok(TextDocument {
                    pages: document.pages.iter().take(max_pages).cloned().collect(),
                    created_on: document.created_on,
                }),
                Err(message) => Err(IngestError::MalformedDocument(message.clone())),
            }
        }
    }

    struct TwoPages;

    impl PageRasterizer for TwoPages {
        fn rasterize<'a>(&'a self, _pdf: &'a [u8]) -> RasterFuture<'a> {
            Box::pin(async { Ok(vec![b"page-1".to_vec(), b"page-2".to_vec()]) })
        }
    }

    struct ScriptedVision {
        reads: Vec<VisionRead>,
        seen: Mutex<Vec<(Vec<u8>, String)>>,
    }

    impl VisionReader for ScriptedVision {
        fn read_page<'a>(&'a self, image: &'a [u8], mime_type: &'a str) -> VisionFuture<'a> {
            let mut seen = self.seen.lock().expect("lock");
            let read = self.reads.get(seen.len()).cloned().unwrap_or_default();
            seen.push((image.to_vec(), mime_type.to_owned()));
            Box::pin(async move { Ok(read) })
        }
    }

    fn text(pages: &[&str], created_on: Option<Date>) -> Arc<FixedText> {
        Arc::new(FixedText(Ok(TextDocument {
            pages: pages.iter().map(|page| (*page).to_owned()).collect(),
            created_on,
        })))
    }

    fn confirmed_read() -> VisionRead {
        VisionRead {
            is_rate_table: true,
            headers: vec![String::from("TT BUY"), String::from("TT SELL")],
            date_text: Some(String::from("15-01-2024")),
            time_text: Some(String::from("10:30 AM")),
            rows: vec![VisionRow {
                currency_code: String::from("USD"),
                rates: vec![VisionRate::Number(83.5), VisionRate::Number(84.4)],
            }],
        }
    }

    fn vision(reads: Vec<VisionRead>) -> Arc<ScriptedVision> {
        Arc::new(ScriptedVision {
            reads,
            seen: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn text_layer_wins_when_usable() {
        let extractor = ContentExtractor::new(text(
            &["Date 15-01-2024\nTime 10:30 AM", "TT BUY TT SELL\nDollar USD/INR 83.50 84.40"],
            None,
        ));

        let extracted = extractor.extract(b"%PDF-1.7").await.expect("extracted");
        assert_eq!(extracted.strategy, ExtractionStrategy::TextLayer);
        assert_eq!(extracted.published_at.to_string(), "2024-01-15 10:30");
        assert_eq!(extracted.table.rows.len(), 1);
    }

    #[tokio::test]
    async fn text_without_rows_falls_back_to_first_confirming_page() {
        let reader = vision(vec![VisionRead::default(), confirmed_read()]);
        let extractor = ContentExtractor::new(text(&["Date 15-01-2024\nTime 10:30"], None))
            .with_vision(Arc::new(TwoPages), reader.clone());

        let extracted = extractor.extract(b"%PDF-1.7").await.expect("extracted");
        assert_eq!(extracted.strategy, ExtractionStrategy::ImageVision);
        assert_eq!(extracted.table.rows[0].rates[1].as_str(), "84.40");

        let seen = reader.seen.lock().expect("lock");
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], (b"page-2".to_vec(), String::from("image/png")));
    }

    #[tokio::test]
    async fn malformed_container_routes_to_vision() {
        let extractor = ContentExtractor::new(Arc::new(FixedText(Err(String::from("bad xref")))))
            .with_vision(Arc::new(TwoPages), vision(vec![confirmed_read()]));

        let extracted = extractor.extract(b"%PDF-1.7").await.expect("extracted");
        assert_eq!(extracted.strategy, ExtractionStrategy::ImageVision);
    }

    #[tokio::test]
    async fn ambiguous_text_date_is_fatal_without_trying_vision() {
        let reader = vision(vec![confirmed_read()]);
        let extractor = ContentExtractor::new(text(
            &["Date 03-04-2024\nTime 10:30\nTT BUY TT SELL\nDollar USD 83.50 84.40"],
            Some(date!(2024-05-01)),
        ))
        .with_vision(Arc::new(TwoPages), reader.clone());

        let error = extractor.extract(b"%PDF-1.7").await.expect_err("ambiguous");
        assert!(matches!(error, IngestError::DateTimeExtraction(_)));
        assert!(reader.seen.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn no_confirming_page_is_extraction_failure() {
        let extractor = ContentExtractor::new(text(&["   "], None))
            .with_vision(Arc::new(TwoPages), vision(Vec::new()));

        let error = extractor.extract(b"%PDF-1.7").await.expect_err("unconfirmed");
        assert!(matches!(error, IngestError::ExtractionFailed(_)));
    }

    #[tokio::test]
    async fn without_vision_the_text_error_surfaces() {
        let extractor = ContentExtractor::new(text(&["TT BUY TT SELL\nnothing"], None));
        let error = extractor.extract(b"%PDF-1.7").await.expect_err("no date");
        assert!(matches!(error, IngestError::DateTimeExtraction(_)));
    }

    #[tokio::test]
    async fn scanned_images_go_straight_to_vision() {
        let reader = vision(vec![confirmed_read()]);
        let extractor = ContentExtractor::new(Arc::new(FixedText(Err(String::from("unused")))))
            .with_vision(Arc::new(TwoPages), reader.clone());

        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0x00];
        extractor.extract(&jpeg).await.expect("extracted");
        assert_eq!(reader.seen.lock().expect("lock")[0].1, "image/jpeg");
    }

    #[tokio::test]
    async fn confirmed_table_without_valid_rows_is_no_rates_found() {
        let mut read = confirmed_read();
        read.rows[0].rates.pop();
        let extractor = ContentExtractor::new(text(&[""], None))
            .with_vision(Arc::new(TwoPages), vision(vec![read]));

        let error = extractor.extract(b"%PDF-1.7").await.expect_err("no rows");
        assert!(matches!(error, IngestError::NoRatesFound(_)));
    }
}
