use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::process::Command;
use tracing::debug;

use crate::IngestError;

/// Default rendering resolution; fine print stays legible to the vision model.
pub const DEFAULT_DPI: u32 = 300;

pub type RasterFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<Vec<u8>>, IngestError>> + Send + 'a>>;

/// Renders every page of a PDF to PNG bytes, in page order.
pub trait PageRasterizer: Send + Sync {
    fn rasterize<'a>(&'a self, pdf: &'a [u8]) -> RasterFuture<'a>;
}

/// Rasterizer backed by poppler's `pdftoppm`.
#[derive(Debug, Clone)]
pub struct PdftoppmRasterizer {
    program: PathBuf,
    dpi: u32,
}

impl Default for PdftoppmRasterizer {
    fn default() -> Self {
        Self::new(DEFAULT_DPI)
    }
}

impl PdftoppmRasterizer {
    pub fn new(dpi: u32) -> Self {
        Self {
            program: PathBuf::from("pdftoppm"),
            dpi,
        }
    }

    /// Uses a specific `pdftoppm` binary instead of the one on `PATH`.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    async fn render(&self, pdf: &[u8]) -> Result<Vec<Vec<u8>>, IngestError> {
        let workdir = tempfile::Builder::new().prefix("refrate-raster-").tempdir()?;
        let input = workdir.path().join("document.pdf");
        tokio::fs::write(&input, pdf).await?;
        let stem = workdir.path().join("page");

        let output = Command::new(&self.program)
            .arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg(&input)
            .arg(&stem)
            .output()
            .await
            .map_err(|e| {
                IngestError::ExtractionFailed(format!(
                    "failed to run {}: {e}",
                    self.program.display()
                ))
            })?;
        if !output.status.success() {
            return Err(IngestError::ExtractionFailed(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let paths = rendered_pages(workdir.path()).await?;
        let mut pages = Vec::with_capacity(paths.len());
        for path in &paths {
            pages.push(tokio::fs::read(path).await?);
        }
        debug!(pages = pages.len(), dpi = self.dpi, "rasterized document");
        Ok(pages)
    }
}

impl PageRasterizer for PdftoppmRasterizer {
    fn rasterize<'a>(&'a self, pdf: &'a [u8]) -> RasterFuture<'a> {
        Box::pin(self.render(pdf))
    }
}

/// `page-1.png`, `page-2.png`, ... sorted by page number. pdftoppm pads the
/// number to the width of the page count, so lexical order is not enough.
async fn rendered_pages(dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let mut numbered = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let number = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.strip_prefix("page-"))
            .and_then(|digits| digits.parse::<u32>().ok());
        if let (Some(number), Some("png")) = (number, path.extension().and_then(|e| e.to_str())) {
            numbered.push((number, path));
        }
    }
    numbered.sort_by_key(|(number, _)| *number);
    Ok(numbered.into_iter().map(|(_, path)| path).collect())
}
