//! Batch ingestion over a directory tree.

use std::fs::{self, ReadDir};
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::pipeline::Ingestor;
use crate::sniff::DocumentKind;
use crate::{DocumentFailure, IngestError};

/// Cumulative result of one batch run.
#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub documents_seen: usize,
    pub documents_ingested: usize,
    pub observations_committed: usize,
    pub failures: Vec<DocumentFailure>,
}

impl BatchReport {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            documents_seen: 0,
            documents_ingested: 0,
            observations_committed: 0,
            failures: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Documents found under a root, plus the entries below it that could not
/// be listed.
#[derive(Debug, Default)]
pub struct Discovery {
    /// PDF and image documents, sorted by path.
    pub documents: Vec<PathBuf>,
    pub failures: Vec<DocumentFailure>,
}

impl Discovery {
    fn skip(&mut self, path: &Path, err: io::Error) {
        warn!(path = %path.display(), error = %err, "skipping unreadable entry");
        self.failures
            .push(DocumentFailure::new(path.display().to_string(), IngestError::Io(err)));
    }
}

/// Recursively lists PDF and image documents under `root`. Fails only when
/// `root` itself cannot be listed.
pub fn discover_documents(root: &Path) -> Result<Discovery, IngestError> {
    discover_with(root, &|dir: &Path| fs::read_dir(dir))
}

fn discover_with<F>(root: &Path, list: &F) -> Result<Discovery, IngestError>
where
    F: Fn(&Path) -> io::Result<ReadDir>,
{
    let mut discovery = Discovery::default();
    collect_documents(root, list(root)?, list, &mut discovery);
    discovery.documents.sort();
    Ok(discovery)
}

fn collect_documents<F>(dir: &Path, entries: ReadDir, list: &F, discovery: &mut Discovery)
where
    F: Fn(&Path) -> io::Result<ReadDir>,
{
    for entry in entries {
        let (path, kind) = match entry.and_then(|entry| Ok((entry.path(), entry.file_type()?))) {
            Ok(listed) => listed,
            Err(err) => {
                discovery.skip(dir, err);
                continue;
            }
        };
        if kind.is_dir() {
            match list(&path) {
                Ok(entries) => collect_documents(&path, entries, list, discovery),
                Err(err) => discovery.skip(&path, err),
            }
        } else if DocumentKind::from_path(&path).is_some() {
            discovery.documents.push(path);
        }
    }
}

/// Ingests every document under `root` one at a time, recording failures
/// and moving on. Only a failure to list `root` aborts the run; unreadable
/// subdirectories are reported as failures without counting as documents.
pub async fn run_batch(ingestor: &Ingestor, root: &Path) -> Result<BatchReport, IngestError> {
    let Discovery { documents, failures } = discover_documents(root)?;
    let mut report = BatchReport::new();
    for failure in failures {
        error!(run_id = %report.run_id, stage = %failure.stage, "{failure}");
        report.failures.push(failure);
    }
    info!(run_id = %report.run_id, root = %root.display(), documents = documents.len(), "batch started");

    for path in documents {
        report.documents_seen += 1;
        match ingestor.ingest_file(&path).await {
            Ok(outcome) => {
                report.documents_ingested += 1;
                report.observations_committed += outcome.observations.len();
            }
            Err(err) => {
                let failure = DocumentFailure::new(path.display().to_string(), err);
                error!(run_id = %report.run_id, stage = %failure.stage, "{failure}");
                report.failures.push(failure);
            }
        }
    }

    info!(
        run_id = %report.run_id,
        seen = report.documents_seen,
        ingested = report.documents_ingested,
        failed = report.failures.len(),
        observations = report.observations_committed,
        "batch finished"
    );
    Ok(report)
}
