//! OCR fallback for image-only PDFs.
//!
//! Native extraction sometimes yields no text (scanned documents). When the
//! deployment image ships `pdftoppm` and `tesseract`, pages are rasterized
//! into a scratch dir and OCR'd one by one, preserving page order.

use std::path::PathBuf;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::BotError;

/// Render resolution for rasterized pages. 200 DPI keeps tesseract accurate
/// without ballooning runtime on long documents.
const RASTER_DPI: u32 = 200;

pub struct OcrEngine {
    pdftoppm: PathBuf,
    tesseract: PathBuf,
}

impl OcrEngine {
    /// Probe PATH for the required binaries. Returns None when either is
    /// missing; the caller degrades to a "no searchable text" reply.
    pub fn detect() -> Option<Self> {
        let pdftoppm = which::which("pdftoppm").ok()?;
        let tesseract = which::which("tesseract").ok()?;
        debug!(?pdftoppm, ?tesseract, "OCR engine available");
        Some(Self { pdftoppm, tesseract })
    }

    /// OCR every page of the PDF, returning one text string per page in
    /// page order.
    pub async fn extract_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, BotError> {
        let dir = tempfile::tempdir()
            .map_err(|e| BotError::ExtractionFailed(format!("ocr tempdir: {e}")))?;
        let pdf_path = dir.path().join("input.pdf");
        tokio::fs::write(&pdf_path, pdf_bytes)
            .await
            .map_err(|e| BotError::ExtractionFailed(format!("ocr write: {e}")))?;

        let out = Command::new(&self.pdftoppm)
            .arg("-r")
            .arg(RASTER_DPI.to_string())
            .arg("-png")
            .arg(&pdf_path)
            .arg(dir.path().join("page"))
            .output()
            .await
            .map_err(|e| BotError::ExtractionFailed(format!("pdftoppm spawn: {e}")))?;
        if !out.status.success() {
            return Err(BotError::ExtractionFailed(format!(
                "pdftoppm exited with {}",
                out.status
            )));
        }

        // pdftoppm zero-pads page numbers, so lexicographic order is page
        // order.
        let mut images: Vec<PathBuf> = std::fs::read_dir(dir.path())
            .map_err(|e| BotError::ExtractionFailed(format!("ocr readdir: {e}")))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
            .collect();
        images.sort();

        let mut pages = Vec::with_capacity(images.len());
        for image in &images {
            pages.push(self.ocr_image(image).await?);
        }
        Ok(pages)
    }

    async fn ocr_image(&self, image: &PathBuf) -> Result<String, BotError> {
        let out = Command::new(&self.tesseract)
            .arg(image)
            // "stdout" makes tesseract print the recognized text instead of
            // writing a sidecar file.
            .arg("stdout")
            .output()
            .await
            .map_err(|e| BotError::ExtractionFailed(format!("tesseract spawn: {e}")))?;
        if !out.status.success() {
            warn!(?image, status = %out.status, "tesseract failed on page image");
            return Err(BotError::ExtractionFailed(format!(
                "tesseract exited with {}",
                out.status
            )));
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }
}
