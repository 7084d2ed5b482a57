//! # Recognition Boundary
//!
//! The character-recognition engine is an external collaborator. This module
//! defines the narrow interface the orchestrator talks to and a Tesseract
//! implementation of it built on `leptess`.
//!
//! Engine instances are expensive to initialize (100-500ms), so the Tesseract
//! engine keeps one instance per language tag and reuses it across pages.

use std::collections::HashMap;
use std::sync::Arc;

use leptess::LepTess;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ocr_config::RecognitionConfig;
use crate::ocr_errors::RecognitionError;
use crate::raster::Raster;

/// Text returned by one recognition call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    pub text: String,
    /// Engine-reported mean confidence on a 0-100 scale, when available
    pub confidence: Option<f32>,
}

/// One recognized word with its bounding box in page pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordBox {
    pub block: u32,
    pub paragraph: u32,
    pub line: u32,
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
    pub confidence: f32,
    pub text: String,
}

impl WordBox {
    pub fn right(&self) -> u32 {
        self.left + self.width
    }

    /// Identifies the text line the word belongs to.
    pub fn line_key(&self) -> (u32, u32, u32) {
        (self.block, self.paragraph, self.line)
    }
}

/// An engine turning a page raster into text.
///
/// Implementations must be callable from several worker threads at once.
pub trait RecognitionEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Recognizes the text on one page.
    fn recognize(&self, raster: &Raster, language: &str) -> Result<Recognition, RecognitionError>;

    /// Word-level layout for table detection. Engines without layout output
    /// report themselves unavailable.
    fn word_boxes(&self, _raster: &Raster, _language: &str) -> Result<Vec<WordBox>, RecognitionError> {
        Err(RecognitionError::EngineUnavailable(format!(
            "{} does not report word boxes",
            self.name()
        )))
    }
}

/// Tesseract engine with per-language instance reuse.
pub struct TesseractEngine {
    tessdata_path: Option<String>,
    dpi: u32,
    instances: Mutex<HashMap<String, Arc<Mutex<LepTess>>>>,
}

impl TesseractEngine {
    /// Creates an engine without touching the native library. Instances are
    /// created on first use; see [`engine_factory::build_engine`] for an eager
    /// variant.
    pub fn new(config: &RecognitionConfig) -> Self {
        let tessdata_path = config
            .tessdata_path
            .clone()
            .or_else(Self::discover_tessdata_path);
        Self {
            tessdata_path,
            dpi: config.dpi,
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create the instance for a language tag.
    ///
    /// # Errors
    ///
    /// Returns `RecognitionError::EngineUnavailable` when Tesseract cannot be
    /// initialized, typically because the library or the language data is
    /// missing.
    pub fn instance(&self, language: &str) -> Result<Arc<Mutex<LepTess>>, RecognitionError> {
        if let Some(instance) = self.instances.lock().get(language) {
            return Ok(Arc::clone(instance));
        }

        info!(
            language = %language,
            tessdata = ?self.tessdata_path,
            "Creating new Tesseract instance"
        );

        let tess = LepTess::new(self.tessdata_path.as_deref(), language).map_err(|e| {
            RecognitionError::EngineUnavailable(format!(
                "Failed to initialize Tesseract for '{}': {}",
                language, e
            ))
        })?;

        let instance = Arc::new(Mutex::new(tess));
        self.instances
            .lock()
            .insert(language.to_string(), Arc::clone(&instance));
        Ok(instance)
    }

    /// Number of cached instances
    pub fn instance_count(&self) -> usize {
        self.instances.lock().len()
    }

    fn load_page(&self, tess: &mut LepTess, raster: &Raster) -> Result<(), RecognitionError> {
        if raster.is_empty() {
            return Err(RecognitionError::Corrupt("page raster is empty".to_string()));
        }

        let png = raster
            .encode_png()
            .map_err(|e| RecognitionError::Corrupt(format!("Failed to encode page: {}", e)))?;
        tess.set_image_from_mem(&png)
            .map_err(|e| RecognitionError::Corrupt(format!("Failed to load page for OCR: {}", e)))?;
        tess.set_source_resolution(self.dpi as i32);
        Ok(())
    }

    /// First tessdata directory found among the usual install locations.
    fn discover_tessdata_path() -> Option<String> {
        let possible_paths = [
            "/usr/share/tesseract-ocr/5/tessdata",
            "/usr/share/tesseract-ocr/4.00/tessdata",
            "/usr/share/tessdata",
            "/usr/local/share/tessdata",
        ];

        let found = possible_paths
            .iter()
            .find(|path| std::path::Path::new(path).exists())
            .map(|path| path.to_string());
        match &found {
            Some(path) => debug!("Using tessdata path: {}", path),
            None => debug!("No tessdata directory found, using Tesseract default"),
        }
        found
    }
}

impl RecognitionEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, raster: &Raster, language: &str) -> Result<Recognition, RecognitionError> {
        let start_time = std::time::Instant::now();
        let instance = self.instance(language)?;

        let (raw_text, mean_confidence) = {
            let mut tess = instance.lock();
            self.load_page(&mut tess, raster)?;
            let text = tess.get_utf8_text().map_err(|e| {
                RecognitionError::Corrupt(format!("Failed to extract text from page: {}", e))
            })?;
            (text, tess.mean_text_conf())
        };

        // Drop surrounding whitespace and empty lines
        let text = raw_text
            .trim()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<&str>>()
            .join("\n");

        debug!(
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            characters = text.len(),
            confidence = mean_confidence,
            "Tesseract recognition finished"
        );

        Ok(Recognition {
            text,
            confidence: Some((mean_confidence as f32).clamp(0.0, 100.0)),
        })
    }

    fn word_boxes(&self, raster: &Raster, language: &str) -> Result<Vec<WordBox>, RecognitionError> {
        let instance = self.instance(language)?;
        let tsv = {
            let mut tess = instance.lock();
            self.load_page(&mut tess, raster)?;
            tess.get_tsv_text(0).map_err(|e| {
                RecognitionError::Corrupt(format!("Failed to read page layout: {}", e))
            })?
        };
        Ok(parse_tsv(&tsv))
    }
}

/// Parses Tesseract TSV output into word boxes.
///
/// Only word rows (level 5) with non-blank text are kept; malformed rows are
/// skipped.
pub fn parse_tsv(tsv: &str) -> Vec<WordBox> {
    tsv.lines()
        .filter_map(|row| {
            let fields: Vec<&str> = row.split('\t').collect();
            if fields.len() < 12 || fields[0] != "5" {
                return None;
            }
            let number = |index: usize| fields[index].trim().parse::<u32>().ok();
            let text = fields[11].trim();
            if text.is_empty() {
                return None;
            }
            Some(WordBox {
                block: number(2)?,
                paragraph: number(3)?,
                line: number(4)?,
                left: number(6)?,
                top: number(7)?,
                width: number(8)?,
                height: number(9)?,
                confidence: fields[10].trim().parse::<f32>().ok()?,
                text: text.to_string(),
            })
        })
        .collect()
}

/// Startup construction of recognition collaborators.
pub mod engine_factory {
    use super::*;

    /// Builds the Tesseract engine and initializes it for the configured
    /// language right away, so a missing native library or language pack is
    /// reported before any document is touched.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use doc_quality::ocr_config::RecognitionConfig;
    /// use doc_quality::recognition::engine_factory::build_engine;
    ///
    /// let engine = build_engine(&RecognitionConfig::default())?;
    /// # Ok::<(), doc_quality::ocr_errors::RecognitionError>(())
    /// ```
    pub fn build_engine(
        config: &RecognitionConfig,
    ) -> Result<Arc<dyn RecognitionEngine>, RecognitionError> {
        let engine = TesseractEngine::new(config);
        engine.instance(&config.language)?;
        info!(
            language = %config.language,
            dpi = config.dpi,
            "Recognition engine ready"
        );
        Ok(Arc::new(engine))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t800\t600\t-1\t
4\t1\t1\t1\t1\t0\t10\t20\t300\t18\t-1\t
5\t1\t1\t1\t1\t1\t10\t20\t60\t18\t95.5\tConcepto
5\t1\t1\t1\t1\t2\t200\t20\t50\t18\t91.0\tImporte
5\t1\t1\t1\t1\t3\t260\t20\t5\t18\t10.0\t
5\t1\t1\t1\t2\t1\t10\t44\t70\t18\tbad\tRoto";

    #[test]
    fn test_parse_tsv_keeps_word_rows() {
        let words = parse_tsv(SAMPLE_TSV);
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text, "Concepto");
        assert_eq!(words[0].line_key(), (1, 1, 1));
        assert_eq!(words[1].left, 200);
        assert_eq!(words[1].right(), 250);
        assert!((words[1].confidence - 91.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_parse_tsv_empty_input() {
        assert!(parse_tsv("").is_empty());
    }

    struct TextOnlyEngine;

    impl RecognitionEngine for TextOnlyEngine {
        fn name(&self) -> &str {
            "text-only"
        }

        fn recognize(&self, _raster: &Raster, _language: &str) -> Result<Recognition, RecognitionError> {
            Ok(Recognition::default())
        }
    }

    #[test]
    fn test_default_word_boxes_is_unavailable() {
        let raster = Raster::Gray(image::GrayImage::new(2, 2));
        let result = TextOnlyEngine.word_boxes(&raster, "spa");
        assert!(matches!(result, Err(RecognitionError::EngineUnavailable(_))));
    }

    #[test]
    fn test_engine_construction_is_lazy() {
        let engine = TesseractEngine::new(&RecognitionConfig::default());
        assert_eq!(engine.instance_count(), 0);
        assert_eq!(engine.name(), "tesseract");
    }
}
