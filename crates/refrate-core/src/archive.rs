//! Dated archive of acquired documents.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use time::Date;
use tracing::{debug, info};

use crate::sniff::DocumentKind;
use crate::IngestError;

/// Files documents under `<root>/<YYYY>/<M>/<YYYY-MM-DD>.<ext>`.
///
/// An archived document is never overwritten: a second document for the
/// same publication date keeps the first file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentArchive {
    root: PathBuf,
}

impl DocumentArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, published_on: Date, kind: DocumentKind) -> PathBuf {
        let extension = match kind {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Png => "png",
            DocumentKind::Jpeg => "jpg",
        };
        self.root
            .join(published_on.year().to_string())
            .join(u8::from(published_on.month()).to_string())
            .join(format!("{published_on}.{extension}"))
    }

    /// Archives `bytes` and returns the archived path.
    pub fn store(
        &self,
        published_on: Date,
        kind: DocumentKind,
        bytes: &[u8],
    ) -> Result<PathBuf, IngestError> {
        let path = self.path_for(published_on, kind);
        if path.exists() {
            debug!(path = %path.display(), "document already archived");
            return Ok(path);
        }

        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;
        let mut temp = tempfile::Builder::new()
            .prefix(".refrate-")
            .suffix(".part")
            .tempfile_in(dir)?;
        temp.write_all(bytes)?;
        temp.as_file().sync_all()?;
        match temp.persist_noclobber(&path) {
            Ok(_) => {
                info!(path = %path.display(), bytes = bytes.len(), "archived document");
                Ok(path)
            }
            // Lost a race with another writer for the same date.
            Err(error) if path.exists() => {
                debug!(path = %path.display(), error = %error.error, "archive entry appeared concurrently");
                Ok(path)
            }
            Err(error) => Err(IngestError::Io(error.error)),
        }
    }
}
