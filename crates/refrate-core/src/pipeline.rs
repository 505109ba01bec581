//! Per-document ingestion: extract, bind, archive, merge.

use std::path::Path;
use std::sync::Arc;

use refrate_store::{MergeOutcome, MergeReport, SeriesStore, StoreError};
use serde::Serialize;
use tracing::{info, info_span, Instrument};

use crate::archive::DocumentArchive;
use crate::config::IngestConfig;
use crate::extract::{
    ContentExtractor, ExtractedTable, ExtractionStrategy, LopdfReader, OpenAiVisionReader,
    PdftoppmRasterizer,
};
use crate::fetch::{FetchTier, SourceFetcher};
use crate::http_client::HttpClient;
use crate::sniff::DocumentKind;
use crate::{CurrencyCode, IngestError, PublishedAt, RateObservation};

/// One committed currency.
#[derive(Debug, Clone, Serialize)]
pub struct CommittedObservation {
    pub currency: CurrencyCode,
    pub outcome: MergeOutcome,
    pub series_len: usize,
}

/// What one document contributed to the store.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub document: String,
    pub published_at: PublishedAt,
    pub strategy: ExtractionStrategy,
    pub source_reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetched_via: Option<FetchTier>,
    pub observations: Vec<CommittedObservation>,
}

/// Merges one observation into its currency's series.
pub fn merge_observation(
    store: &SeriesStore,
    observation: &RateObservation,
) -> Result<MergeReport, IngestError> {
    let record = observation.to_record();
    store
        .merge(
            observation.currency().as_str(),
            observation.schema().columns(),
            &record,
        )
        .map_err(store_error)
}

/// Column mismatches are a table reading problem, not a storage failure.
fn store_error(error: StoreError) -> IngestError {
    match error {
        StoreError::ColumnMismatch { .. } => IngestError::NoRatesFound(error.to_string()),
        other => IngestError::Store(other),
    }
}

/// Drives documents through extraction into the series store.
pub struct Ingestor {
    store: SeriesStore,
    extractor: ContentExtractor,
    archive: Option<DocumentArchive>,
}

impl Ingestor {
    pub fn new(store: SeriesStore, extractor: ContentExtractor) -> Self {
        Self {
            store,
            extractor,
            archive: None,
        }
    }

    pub fn with_archive(mut self, archive: DocumentArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Production wiring: lopdf text layer, pdftoppm and the configured
    /// vision endpoint when present.
    pub fn from_config(config: &IngestConfig, client: Arc<dyn HttpClient>) -> Result<Self, IngestError> {
        let store = SeriesStore::open(config.store_config())?;
        let mut extractor =
            ContentExtractor::new(Arc::new(LopdfReader)).with_max_pages(config.max_pages);
        if let Some(vision) = &config.vision {
            extractor = extractor.with_vision(
                Arc::new(PdftoppmRasterizer::new(vision.dpi)),
                Arc::new(OpenAiVisionReader::new(client, vision.clone())),
            );
        }

        let mut ingestor = Self::new(store, extractor);
        if let Some(dir) = &config.archive_dir {
            ingestor = ingestor.with_archive(DocumentArchive::new(dir));
        }
        Ok(ingestor)
    }

    pub fn store(&self) -> &SeriesStore {
        &self.store
    }

    /// Ingests a local document; its path is the source reference.
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestOutcome, IngestError> {
        let bytes = tokio::fs::read(path).await?;
        let document = path.display().to_string();
        self.ingest_bytes(&bytes, &document, Some(document.as_str()))
            .instrument(info_span!("ingest", document = %document))
            .await
    }

    /// Acquires the current document, archives it and ingests it.
    pub async fn fetch_and_ingest(&self, fetcher: &SourceFetcher) -> Result<IngestOutcome, IngestError> {
        let fetched = fetcher.fetch().await?;
        let mut outcome = self
            .ingest_bytes(&fetched.bytes, &fetched.url, None)
            .instrument(info_span!("ingest", document = %fetched.url))
            .await?;
        outcome.fetched_via = Some(fetched.tier);
        Ok(outcome)
    }

    /// Extracts `bytes` and merges one observation per currency row.
    ///
    /// Without an explicit `source_reference` the document is archived and
    /// the archived path is used; with neither, `document` is.
    pub async fn ingest_bytes(
        &self,
        bytes: &[u8],
        document: &str,
        source_reference: Option<&str>,
    ) -> Result<IngestOutcome, IngestError> {
        let extracted = self.extractor.extract(bytes).await?;
        let source_reference = match (source_reference, &self.archive) {
            (Some(reference), _) => reference.to_owned(),
            (None, Some(archive)) => {
                let kind = DocumentKind::sniff(bytes).unwrap_or(DocumentKind::Pdf);
                archive
                    .store(extracted.published_at.date(), kind, bytes)?
                    .display()
                    .to_string()
            }
            (None, None) => document.to_owned(),
        };
        self.commit(document, extracted, source_reference)
    }

    fn commit(
        &self,
        document: &str,
        extracted: ExtractedTable,
        source_reference: String,
    ) -> Result<IngestOutcome, IngestError> {
        let ExtractedTable {
            published_at,
            table,
            strategy,
        } = extracted;

        let pending = table
            .rows
            .into_iter()
            .map(|row| {
                RateObservation::new(
                    published_at,
                    row.currency,
                    table.schema.clone(),
                    row.rates,
                    source_reference.as_str(),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        // Nothing is merged unless every currency fits its stored header.
        for observation in &pending {
            self.store
                .ensure_compatible(observation.currency().as_str(), &observation.to_record())
                .map_err(store_error)?;
        }

        let mut observations = Vec::with_capacity(pending.len());
        for observation in pending {
            let report = merge_observation(&self.store, &observation)?;
            observations.push(CommittedObservation {
                currency: observation.currency().clone(),
                outcome: report.outcome,
                series_len: report.series_len,
            });
        }

        info!(
            document,
            %published_at,
            %strategy,
            committed = observations.len(),
            "document ingested"
        );
        Ok(IngestOutcome {
            document: document.to_owned(),
            published_at,
            strategy,
            source_reference,
            fetched_via: None,
            observations,
        })
    }
}
