//! # Document Processing
//!
//! Loads input documents into page rasters, runs one quality-driven
//! orchestrator per page on the blocking pool, and assembles the corrected
//! text, tables and diagnostics of the whole document.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use image::{DynamicImage, RgbaImage};
use pdfium_render::prelude::{PdfRenderConfig, Pdfium};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn, Instrument};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::observability::{document_span, page_span, record_document_metrics};
use crate::ocr_config::{FORMAT_DETECTION_BUFFER_SIZE, MIN_FORMAT_BYTES};
use crate::orchestrator::{OrchestrationOutcome, OrchestratorState, QualityDrivenOrchestrator};
use crate::preprocessing::{QualityMetrics, StageKind};
use crate::raster::Raster;
use crate::recognition::RecognitionEngine;
use crate::tables::{extract_or_empty, Table, TableExtractor};
use crate::text_validation::{StructuredData, TextQualityMetrics, TextQualityValidator};

/// File extensions accepted as input documents
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp"];

/// Leading bytes of every PDF file
const PDF_MAGIC: &[u8] = b"%PDF-";
/// PDF user-space units per inch
const PDF_POINTS_PER_INCH: f32 = 72.0;

/// Reads an input document into page rasters.
///
/// PDFs are rendered page by page at `dpi`. Any other supported file is a
/// single-page raster image. The format is detected from the file header
/// rather than the extension.
///
/// # Errors
///
/// Returns `AppError::Input` when the file is missing, empty, too large, not
/// a decodable image, or a PDF that cannot be rendered.
pub fn load_pages(path: &Path, max_file_size: u64, dpi: u32) -> AppResult<Vec<Raster>> {
    let shown = path.display();
    if !path.exists() {
        return Err(AppError::Input(format!("file does not exist ({})", shown)));
    }
    if !path.is_file() {
        return Err(AppError::Input(format!("path is not a file ({})", shown)));
    }

    let file_size = path
        .metadata()
        .map_err(|e| AppError::Input(format!("cannot read file metadata ({}): {}", shown, e)))?
        .len();
    if file_size == 0 {
        return Err(AppError::Input(format!("file is empty ({})", shown)));
    }
    if file_size > max_file_size {
        return Err(AppError::Input(format!(
            "file too large: {} bytes (maximum allowed: {} bytes)",
            file_size, max_file_size
        )));
    }

    let header = {
        let file = File::open(path)
            .map_err(|e| AppError::Input(format!("cannot open {}: {}", shown, e)))?;
        let mut reader = BufReader::new(file);
        let mut buffer = vec![0; FORMAT_DETECTION_BUFFER_SIZE];
        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| AppError::Input(format!("cannot read {}: {}", shown, e)))?;
        if bytes_read < MIN_FORMAT_BYTES {
            return Err(AppError::Input(format!(
                "file too small to detect its format ({} bytes)",
                bytes_read
            )));
        }
        buffer.truncate(bytes_read);
        buffer
    };

    if header.starts_with(PDF_MAGIC) {
        return rasterize_pdf(path, dpi);
    }

    let format = image::guess_format(&header)
        .map_err(|e| AppError::Input(format!("unsupported document format ({}): {}", shown, e)))?;
    let bytes = std::fs::read(path)
        .map_err(|e| AppError::Input(format!("cannot read {}: {}", shown, e)))?;
    let image = image::load_from_memory_with_format(&bytes, format)
        .map_err(|e| AppError::Input(format!("cannot decode {:?} image {}: {}", format, shown, e)))?;

    debug!(
        path = %path.display(),
        format = ?format,
        width = image.width(),
        height = image.height(),
        "Loaded document page"
    );
    Ok(vec![Raster::from(image)])
}

/// Pixel size of a `width_pt` x `height_pt` PDF page rendered at `dpi`.
pub fn pdf_render_size(width_pt: f32, height_pt: f32, dpi: u32) -> (u32, u32) {
    let scale = dpi as f32 / PDF_POINTS_PER_INCH;
    let width = (width_pt * scale).round().max(1.0) as u32;
    let height = (height_pt * scale).round().max(1.0) as u32;
    (width, height)
}

/// Binds the pdfium library from the working directory or the usual system
/// locations.
fn bind_pdfium() -> AppResult<Pdfium> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("/usr/lib")))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("/usr/local/lib"))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| AppError::Input(format!("PDF renderer unavailable: {}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// Renders every page of a PDF to an RGB raster at `dpi`.
fn rasterize_pdf(path: &Path, dpi: u32) -> AppResult<Vec<Raster>> {
    let start_time = Instant::now();
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| AppError::Input(format!("cannot open PDF {}: {}", path.display(), e)))?;

    let mut pages = Vec::new();
    for (index, page) in document.pages().iter().enumerate() {
        let (width, height) = pdf_render_size(page.width().value, page.height().value, dpi);
        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_target_height(height as i32);

        let bitmap = page.render_with_config(&config).map_err(|e| {
            AppError::Input(format!(
                "cannot render page {} of {}: {}",
                index + 1,
                path.display(),
                e
            ))
        })?;
        let rgba = RgbaImage::from_raw(
            bitmap.width() as u32,
            bitmap.height() as u32,
            bitmap.as_rgba_bytes(),
        )
        .ok_or_else(|| {
            AppError::Input(format!(
                "page {} of {} rendered to an inconsistent bitmap",
                index + 1,
                path.display()
            ))
        })?;
        pages.push(Raster::from(DynamicImage::ImageRgba8(rgba)));
    }

    if pages.is_empty() {
        return Err(AppError::Input(format!("PDF has no pages ({})", path.display())));
    }

    debug!(
        path = %path.display(),
        pages = pages.len(),
        dpi,
        duration_ms = start_time.elapsed().as_millis() as u64,
        "Rasterized PDF document"
    );
    Ok(pages)
}

/// Supported documents directly inside `dir`, sorted by path.
pub fn list_input_files(dir: &Path) -> AppResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| AppError::Input(format!("cannot list {}: {}", dir.display(), e)))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_supported_extension(path))
        .collect();
    files.sort();
    Ok(files)
}

fn is_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Diagnostics for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageReport {
    pub page_index: usize,
    pub final_state: OrchestratorState,
    pub accepted: bool,
    pub attempts: u32,
    pub best_attempt: u32,
    pub score: f32,
    pub attempt_scores: Vec<f32>,
    pub confidence: Option<f32>,
    pub image_quality: QualityMetrics,
    pub text_quality: TextQualityMetrics,
    pub applied_stages: Vec<StageKind>,
    pub recognition_error: Option<String>,
    pub elapsed_ms: u64,
}

impl PageReport {
    fn from_outcome(page_index: usize, outcome: &OrchestrationOutcome) -> Self {
        let best = &outcome.best;
        Self {
            page_index,
            final_state: outcome.final_state,
            accepted: outcome.final_state == OrchestratorState::Done,
            attempts: outcome.attempts,
            best_attempt: best.attempt,
            score: best.score,
            attempt_scores: outcome.attempt_scores.clone(),
            confidence: best.confidence,
            image_quality: best.image_quality,
            text_quality: best.text_quality,
            applied_stages: best.applied_stages.clone(),
            recognition_error: best.recognition_error.clone(),
            elapsed_ms: outcome.total_elapsed.as_millis() as u64,
        }
    }
}

/// Diagnostics for a whole document, persisted next to its text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentReport {
    pub source: String,
    pub processed_at: DateTime<Utc>,
    pub language: String,
    pub profile: String,
    pub threshold: f32,
    pub pages: Vec<PageReport>,
    pub total_attempts: u32,
    pub total_elapsed_ms: u64,
    pub table_count: usize,
    pub structured_data: StructuredData,
    pub language_confidence: f32,
}

impl DocumentReport {
    /// True when every page reached the acceptance threshold.
    pub fn all_pages_accepted(&self) -> bool {
        self.pages.iter().all(|page| page.accepted)
    }
}

/// Everything produced for one document.
#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    pub text: String,
    pub report: DocumentReport,
    pub tables: Vec<Table>,
}

/// Processes documents page by page on the blocking thread pool.
pub struct DocumentProcessor {
    orchestrator: Arc<QualityDrivenOrchestrator>,
    tables: Arc<dyn TableExtractor>,
    validator: TextQualityValidator,
    workers: Arc<Semaphore>,
    config: AppConfig,
}

impl DocumentProcessor {
    pub fn new(
        engine: Arc<dyn RecognitionEngine>,
        tables: Arc<dyn TableExtractor>,
        config: AppConfig,
    ) -> Self {
        let orchestrator = QualityDrivenOrchestrator::new(
            engine,
            &config.recognition,
            config.retry.clone(),
            config.enhancement.clone(),
        );
        Self {
            orchestrator: Arc::new(orchestrator),
            tables,
            validator: TextQualityValidator::new(&config.recognition.language),
            workers: Arc::new(Semaphore::new(config.worker_threads.max(1))),
            config,
        }
    }

    /// Loads and processes one document file.
    ///
    /// # Errors
    ///
    /// Only input problems are fatal here; recognition and table failures are
    /// absorbed into the report.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::path::Path;
    /// use std::sync::Arc;
    /// use doc_quality::config::AppConfig;
    /// use doc_quality::document::DocumentProcessor;
    /// use doc_quality::recognition::engine_factory::build_engine;
    /// use doc_quality::tables::DisabledTableExtractor;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = AppConfig::default();
    /// let engine = build_engine(&config.recognition)?;
    /// let processor = DocumentProcessor::new(engine, Arc::new(DisabledTableExtractor), config);
    ///
    /// let document = processor.process(Path::new("input/invoice.png")).await?;
    /// println!("{}", document.text);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn process(&self, path: &Path) -> AppResult<ProcessedDocument> {
        let span = document_span(&path.display().to_string());
        async {
            let pages = load_pages(
                path,
                self.config.max_file_size,
                self.config.recognition.dpi,
            )?;
            self.process_pages(path, pages).await
        }
        .instrument(span)
        .await
    }

    /// Processes already loaded pages of `source`.
    pub async fn process_pages(
        &self,
        source: &Path,
        pages: Vec<Raster>,
    ) -> AppResult<ProcessedDocument> {
        let start_time = Instant::now();
        let deadline =
            start_time + Duration::from_secs(self.config.retry.document_timeout_secs);
        let page_count = pages.len();

        info!(
            source = %source.display(),
            pages = page_count,
            workers = self.config.worker_threads,
            "Processing document"
        );

        let mut handles = Vec::with_capacity(page_count);
        for (page_index, raster) in pages.into_iter().enumerate() {
            let permit = Arc::clone(&self.workers)
                .acquire_owned()
                .await
                .map_err(|e| AppError::Internal(format!("worker pool closed: {}", e)))?;
            let orchestrator = Arc::clone(&self.orchestrator);
            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let _entered = page_span(page_index).entered();
                orchestrator.run_with_deadline(&raster, Some(deadline))
            }));
        }

        let mut outcomes = Vec::with_capacity(page_count);
        for handle in handles {
            let outcome = handle
                .await
                .map_err(|e| AppError::Internal(format!("page worker failed: {}", e)))?;
            outcomes.push(outcome);
        }

        let page_texts: Vec<String> = outcomes
            .iter()
            .map(|outcome| self.validator.correct(&outcome.best.text))
            .collect();
        let text = page_texts
            .iter()
            .filter(|page| !page.trim().is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join("\n\n");

        let tables = if self.config.enable_table_extraction {
            let extractor = Arc::clone(&self.tables);
            let source_path = source.to_path_buf();
            tokio::task::spawn_blocking(move || extract_or_empty(extractor.as_ref(), &source_path))
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "Table extraction task failed");
                    Vec::new()
                })
        } else {
            Vec::new()
        };

        let pages: Vec<PageReport> = outcomes
            .iter()
            .enumerate()
            .map(|(index, outcome)| PageReport::from_outcome(index, outcome))
            .collect();
        let total_elapsed = start_time.elapsed();

        let report = DocumentReport {
            source: source.display().to_string(),
            processed_at: Utc::now(),
            language: self.config.recognition.language.clone(),
            profile: self.config.profile.as_str().to_string(),
            threshold: self.config.retry.min_quality_threshold,
            total_attempts: pages.iter().map(|page| page.attempts).sum(),
            pages,
            total_elapsed_ms: total_elapsed.as_millis() as u64,
            table_count: tables.len(),
            structured_data: self.validator.extract_structured_data(&text),
            language_confidence: self.validator.detect_language_confidence(&text),
        };

        record_document_metrics(true, total_elapsed, page_count);
        info!(
            source = %report.source,
            pages = page_count,
            attempts = report.total_attempts,
            tables = report.table_count,
            accepted = report.all_pages_accepted(),
            elapsed_ms = report.total_elapsed_ms,
            "Document processed"
        );

        Ok(ProcessedDocument {
            text,
            report,
            tables,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_input_error() {
        let result = load_pages(Path::new("/nonexistent/page.png"), 1024, 300);
        assert!(matches!(result, Err(AppError::Input(_))));
    }

    #[test]
    fn test_load_png_page() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("page.png");
        GrayImage::from_pixel(40, 30, Luma([200u8])).save(&path).unwrap();

        let pages = load_pages(&path, 10 * 1024 * 1024, 300).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!((pages[0].width(), pages[0].height()), (40, 30));
    }

    #[test]
    fn test_size_and_format_limits() {
        let dir = tempdir().unwrap();
        let empty = dir.path().join("empty.png");
        std::fs::write(&empty, b"").unwrap();
        assert!(matches!(load_pages(&empty, 1024, 300), Err(AppError::Input(_))));

        let text = dir.path().join("notes.png");
        std::fs::write(&text, b"this is definitely not an image").unwrap();
        assert!(matches!(load_pages(&text, 1024, 300), Err(AppError::Input(_))));
        assert!(matches!(load_pages(&text, 4, 300), Err(AppError::Input(_))));
    }

    #[test]
    fn test_list_input_files_filters_and_sorts() {
        let dir = tempdir().unwrap();
        for name in ["b.PNG", "a.jpg", "c.pdf", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();

        let files = list_input_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.PNG", "c.pdf"]);
    }

    #[test]
    fn test_pdf_pages_render_at_requested_dpi() {
        // US Letter is 612 x 792 points
        assert_eq!(pdf_render_size(612.0, 792.0, 300), (2550, 3300));
        assert_eq!(pdf_render_size(612.0, 792.0, 72), (612, 792));
        assert_eq!(pdf_render_size(595.0, 842.0, 150), (1240, 1754));
        assert_eq!(pdf_render_size(0.2, 0.2, 72), (1, 1));
    }

    #[test]
    fn test_broken_pdf_is_input_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.7\nnot really a document").unwrap();

        // Either the renderer is missing or it rejects the file
        assert!(matches!(load_pages(&path, 1024, 300), Err(AppError::Input(_))));
    }
}
