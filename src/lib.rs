//! # Doc Quality
//!
//! An adaptive OCR pipeline for scanned documents. Pages are geometrically
//! and photometrically normalized, recognized with Tesseract, and scored on
//! both image and text quality. Pages below the acceptance threshold are
//! retried with progressively stronger enhancement until they pass, the
//! attempt budget runs out, or the document deadline expires.

pub mod config;
pub mod document;
pub mod errors;
pub mod observability;
pub mod observability_config;
pub mod ocr_config;
pub mod ocr_errors;
pub mod orchestrator;
pub mod preprocessing;
pub mod raster;
pub mod recognition;
pub mod storage;
pub mod tables;
pub mod text_validation;

// Re-export types for easier access
pub use config::AppConfig;
pub use errors::{AppError, AppResult};
pub use orchestrator::{OrchestrationOutcome, QualityDrivenOrchestrator};
pub use text_validation::TextQualityValidator;
