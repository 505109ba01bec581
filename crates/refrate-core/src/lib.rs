//! # Refrate Core
//!
//! Acquisition, extraction and merge engine for published reference-rate
//! documents.
//!
//! ## Overview
//!
//! A rate document (text PDF or scanned image) goes through:
//!
//! - **Acquisition** with primary/fallback URLs, transport retries and a
//!   rotating proxy tier, accepting only payloads that sniff as PDFs
//! - **Extraction** through an ordered strategy chain, text layer first and
//!   rasterized vision reads second
//! - **Timestamp resolution** that reads numeric dates both day-first and
//!   month-first and refuses to guess between disagreeing readings
//! - **Table parsing** driven by a column schema negotiated from the header row
//! - **Merge** of one observation per currency into its series file
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`archive`] | Dated archive of acquired documents |
//! | [`batch`] | Recursive batch ingestion with a failure report |
//! | [`config`] | Process-wide configuration (defaults, JSON file, environment) |
//! | [`datetime`] | Publication timestamp resolution |
//! | [`domain`] | Validated value types |
//! | [`error`] | Validation and ingestion errors |
//! | [`extract`] | Text layer, rasterizer and vision collaborators |
//! | [`fetch`] | Resilient document acquisition |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`pipeline`] | Per-document ingestion into the store |
//! | [`retry`] | Exponential backoff with jitter |
//! | [`sniff`] | Magic-byte payload classification |
//! | [`table`] | Header-driven rate table parsing |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  SourceFetcher  │──── HttpClient (retry, proxies)
//! └────────┬────────┘
//!          │ bytes
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ContentExtractor │────▶│ TextLayer        │
//! │                 │────▶│ ImageVision      │
//! └────────┬────────┘     └──────────────────┘
//!          │ timestamp + rows
//!          ▼
//! ┌─────────────────┐
//! │  SeriesStore    │  one CSV per currency
//! └─────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use refrate_core::{IngestConfig, Ingestor, ReqwestHttpClient, SourceFetcher};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = IngestConfig::load(None)?;
//!     let client = Arc::new(ReqwestHttpClient::new(config.fetch.user_agent.clone()));
//!     let ingestor = Ingestor::from_config(&config, client.clone())?;
//!     let fetcher = SourceFetcher::new(client, config.fetch.clone());
//!     let outcome = ingestor.fetch_and_ingest(&fetcher).await?;
//!     println!("{} currencies at {}", outcome.observations.len(), outcome.published_at);
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod batch;
pub mod config;
pub mod datetime;
pub mod domain;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod http_client;
pub mod pipeline;
pub mod retry;
pub mod sniff;
pub mod table;

pub use archive::DocumentArchive;
pub use batch::{discover_documents, run_batch, BatchReport, Discovery};
pub use config::{resolve_refrate_home, ConfigError, IngestConfig};
pub use datetime::{read_date, read_time, DateReading, DateTimeError, DateTimeResolver};
pub use domain::{
    canonical_column, column_words, ColumnSchema, CurrencyCode, PublishedAt, RateObservation, RateRow,
    RateValue,
};
pub use error::{DocumentFailure, IngestError, Stage, ValidationError};
pub use extract::{
    Attempt, ContentExtractor, ExtractedTable, ExtractionStrategy, LopdfReader, OpenAiVisionReader,
    PageRasterizer, PdftoppmRasterizer, TextDocument, TextLayerReader, VisionConfig, VisionRead,
    VisionReader,
};
pub use fetch::{FetchConfig, FetchTier, FetchedDocument, SourceFetcher};
pub use http_client::{
    execute_with_retry, HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse,
    ReqwestHttpClient,
};
pub use pipeline::{merge_observation, CommittedObservation, IngestOutcome, Ingestor};
pub use retry::{Backoff, RetryConfig, RetrySettings};
pub use sniff::DocumentKind;
pub use table::{negotiate_schema, parse_row, ParsedTable, RateTableParser, TableError};

// Store (re-exported from refrate-store)
pub use refrate_store::{
    month_end, month_ends, MergeOutcome, MergeReport, MonthEndRow, MonthEndTable, Record, Series,
    SeriesStore, StoreConfig, StoreError, DATE_COLUMN, SOURCE_COLUMN,
};
