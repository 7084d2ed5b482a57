use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use doc_quality::config::AppConfig;
use doc_quality::document::{list_input_files, DocumentProcessor};
use doc_quality::errors::error_logging::log_config_error;
use doc_quality::observability;
use doc_quality::ocr_config::QualityProfile;
use doc_quality::recognition::engine_factory::build_engine;
use doc_quality::storage::{FileResultStore, ResultStore};
use doc_quality::tables::{DisabledTableExtractor, LayoutTableExtractor, TableExtractor};
use tracing::{error, info, warn};

/// Quality-driven OCR for scanned documents.
///
/// Every document is enhanced, recognized and scored; pages that fall below
/// the quality threshold are retried with stronger enhancement.
#[derive(Parser, Debug)]
#[command(name = "doc-quality", version)]
#[command(about = "Adaptive document OCR with quality-driven retries")]
struct Cli {
    /// Documents to process
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    files: Vec<PathBuf>,

    /// Process every supported document in the input directory
    #[arg(long)]
    all: bool,

    /// Quality profile: maximum_quality, fast_processing or balanced
    #[arg(long)]
    profile: Option<QualityProfile>,

    /// Tesseract language code(s), e.g. "spa" or "spa+eng"
    #[arg(long)]
    language: Option<String>,

    /// Upper bound on recognition attempts per page
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Acceptance threshold between 0 and 100
    #[arg(long)]
    min_quality: Option<f32>,

    /// Directory scanned by --all
    #[arg(long)]
    input_dir: Option<PathBuf>,

    /// Directory receiving the results
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

impl Cli {
    /// Command-line values take precedence over the environment.
    ///
    /// `--profile` is not applied here: it replaces `DOCQA_PROFILE` when the
    /// environment is loaded, so explicit variables still override it.
    fn apply_to(&self, config: &mut AppConfig) {
        if let Some(language) = &self.language {
            config.recognition.language = language.clone();
        }
        if let Some(max_attempts) = self.max_attempts {
            config.retry.max_attempts = max_attempts;
        }
        if let Some(min_quality) = self.min_quality {
            config.retry.min_quality_threshold = min_quality;
        }
        if let Some(dir) = &self.input_dir {
            config.input_dir = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::from_env_with_profile(cli.profile).map_err(|e| {
        log_config_error(&e, "environment", "load");
        anyhow::anyhow!("Configuration loading failed: {}", e)
    })?;
    cli.apply_to(&mut config);
    config.validate().map_err(|e| {
        log_config_error(&e, "app_config", "validate");
        anyhow::anyhow!("Configuration validation failed: {}. Please check your configuration values.", e)
    })?;

    observability::init_tracing(&config.logging)?;
    info!("{}", config.summary());

    // Fail fast when Tesseract or the language data is missing
    let engine = build_engine(&config.recognition)
        .map_err(|e| anyhow::anyhow!("Recognition engine unavailable: {}", e))?;

    let tables: Arc<dyn TableExtractor> = if config.enable_table_extraction {
        Arc::new(LayoutTableExtractor::new(
            Arc::clone(&engine),
            &config.recognition.language,
            config.max_file_size,
        )
        .with_dpi(config.recognition.dpi))
    } else {
        Arc::new(DisabledTableExtractor)
    };

    let files = if cli.all {
        list_input_files(&config.input_dir)?
    } else {
        cli.files.clone()
    };
    if files.is_empty() {
        warn!(input_dir = %config.input_dir.display(), "No documents to process");
        return Ok(());
    }

    let store = FileResultStore::new(&config.output_dir)?;
    let processor = DocumentProcessor::new(engine, tables, config);

    let start_time = Instant::now();
    let mut failures = 0usize;
    for path in &files {
        let result = match processor.process(path).await {
            Ok(document) => store.save(&document, path).map(|paths| (document, paths)),
            Err(e) => Err(e),
        };
        match result {
            Ok((document, paths)) => info!(
                source = %path.display(),
                text = %paths.text.display(),
                accepted = document.report.all_pages_accepted(),
                attempts = document.report.total_attempts,
                "Document done"
            ),
            Err(e) => {
                failures += 1;
                observability::record_document_metrics(false, start_time.elapsed(), 0);
                error!(source = %path.display(), error = %e, "Document failed");
            }
        }
    }

    info!(
        documents = files.len(),
        failures,
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "Run finished"
    );

    if failures > 0 {
        return Err(anyhow::anyhow!(
            "{} of {} documents failed",
            failures,
            files.len()
        ));
    }
    Ok(())
}
