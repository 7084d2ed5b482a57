//! Integration tests for the quality-driven retry loop and document processing

mod common;

use std::path::Path;
use std::sync::Arc;

use common::{text_page, word, Reply, ScriptedEngine, WidthEchoEngine};
use doc_quality::config::AppConfig;
use doc_quality::document::DocumentProcessor;
use doc_quality::ocr_config::{EnhancementConfig, RecognitionConfig, RetryPolicy};
use doc_quality::orchestrator::{escalate, OrchestratorState, QualityDrivenOrchestrator};
use doc_quality::preprocessing::StageKind;
use doc_quality::raster::Raster;
use doc_quality::tables::{CellValue, DisabledTableExtractor, LayoutTableExtractor, TableExtractor};

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        min_quality_threshold: 60.0,
        max_attempts,
        document_timeout_secs: 60,
    }
}

fn orchestrator(engine: Arc<ScriptedEngine>, max_attempts: u32) -> QualityDrivenOrchestrator {
    QualityDrivenOrchestrator::new(
        engine,
        &RecognitionConfig::default(),
        policy(max_attempts),
        EnhancementConfig::passthrough(),
    )
}

fn page() -> Raster {
    Raster::Gray(text_page(120, 90))
}

#[test]
fn test_good_first_attempt_is_accepted() {
    let engine = Arc::new(ScriptedEngine::new(vec![Reply::text("Factura número 12.", 90.0)]));
    let outcome = orchestrator(Arc::clone(&engine), 3).run(&page());

    assert_eq!(engine.calls(), 1);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.final_state, OrchestratorState::Done);
    assert_eq!(outcome.best.text, "Factura número 12.");
    assert!((outcome.best.score - 0.9).abs() < 1e-6);
    // Passthrough first attempt leaves the page untouched
    assert!(outcome.best.applied_stages.is_empty());
}

#[test]
fn test_low_score_escalates_once_then_accepts() {
    let engine = Arc::new(ScriptedEngine::new(vec![
        Reply::text("F4ctura ilegib1e", 30.0),
        Reply::text("Factura legible.", 70.0),
    ]));
    let outcome = orchestrator(Arc::clone(&engine), 3).run(&page());

    assert_eq!(engine.calls(), 2);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.final_state, OrchestratorState::Done);
    assert_eq!(outcome.best.attempt, 2);
    assert_eq!(outcome.best.text, "Factura legible.");
    assert_eq!(outcome.attempt_scores.len(), 2);

    // The second attempt ran with the first escalation rung
    let expected = escalate(&EnhancementConfig::passthrough(), 1);
    assert_eq!(outcome.best.config, expected);
    assert!(outcome.best.applied_stages.contains(&StageKind::Binarize));
}

#[test]
fn test_default_config_escalates_to_new_settings() {
    let engine = Arc::new(ScriptedEngine::new(vec![
        Reply::text("ruido", 10.0),
        Reply::text("ruido menor", 20.0),
        Reply::text("Texto casi legible.", 30.0),
    ]));
    let initial = EnhancementConfig::default();
    let outcome = QualityDrivenOrchestrator::new(
        engine.clone(),
        &RecognitionConfig::default(),
        policy(3),
        initial.clone(),
    )
    .run(&page());

    assert_eq!(engine.calls(), 3);
    assert_eq!(outcome.final_state, OrchestratorState::Exhausted);
    assert_eq!(outcome.best.attempt, 3);
    // Each attempt used a stronger configuration than the last
    let configs: Vec<EnhancementConfig> = (0..3).map(|rung| escalate(&initial, rung)).collect();
    assert_ne!(configs[0], configs[1]);
    assert_ne!(configs[1], configs[2]);
    assert_eq!(outcome.best.config, configs[2]);
    assert!(outcome.best.config.enable_perspective_correction);
}

#[test]
fn test_attempts_never_exceed_max() {
    for max_attempts in 1..=4 {
        let engine = Arc::new(ScriptedEngine::new(vec![Reply::text("ruido", 10.0)]));
        let outcome = orchestrator(Arc::clone(&engine), max_attempts).run(&page());

        assert_eq!(engine.calls(), max_attempts as usize);
        assert_eq!(outcome.attempts, max_attempts);
        assert_eq!(outcome.final_state, OrchestratorState::Exhausted);
    }
}

#[test]
fn test_text_score_used_without_confidence() {
    let engine = Arc::new(ScriptedEngine::new(vec![Reply::without_confidence(
        "El informe anual de la empresa.",
    )]));
    let outcome = orchestrator(Arc::clone(&engine), 1).run(&page());

    assert!(outcome.best.confidence.is_none());
    assert_eq!(outcome.best.score, outcome.best.text_quality.composite);
    assert!(outcome.best.score > 0.0);
}

#[test]
fn test_failed_attempts_recover_on_retry() {
    let engine = Arc::new(ScriptedEngine::new(vec![
        Reply::Fail,
        Reply::text("Texto recuperado.", 85.0),
    ]));
    let outcome = orchestrator(Arc::clone(&engine), 3).run(&page());

    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.final_state, OrchestratorState::Done);
    assert_eq!(outcome.best.text, "Texto recuperado.");
    assert!(outcome.best.recognition_error.is_none());
    assert_eq!(outcome.attempt_scores[0], 0.0);
}

fn processor_config() -> AppConfig {
    AppConfig {
        enhancement: EnhancementConfig::passthrough(),
        retry: policy(3),
        worker_threads: 2,
        enable_table_extraction: false,
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn test_pages_are_reassembled_in_order() {
    let processor = DocumentProcessor::new(
        Arc::new(WidthEchoEngine),
        Arc::new(DisabledTableExtractor),
        processor_config(),
    );
    let pages = vec![
        Raster::Gray(text_page(60, 60)),
        Raster::Gray(text_page(70, 60)),
        Raster::Gray(text_page(80, 60)),
    ];

    let document = processor
        .process_pages(Path::new("scan.png"), pages)
        .await
        .unwrap();

    assert_eq!(
        document.text,
        "Página de ancho 60.\n\nPágina de ancho 70.\n\nPágina de ancho 80."
    );
    assert_eq!(document.report.pages.len(), 3);
    assert_eq!(document.report.total_attempts, 3);
    assert!(document.report.all_pages_accepted());
    let indices: Vec<usize> = document.report.pages.iter().map(|p| p.page_index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    assert!(document.tables.is_empty());
}

#[tokio::test]
async fn test_empty_pages_are_skipped_in_text() {
    let engine = Arc::new(ScriptedEngine::new(vec![Reply::Fail]));
    let processor = DocumentProcessor::new(engine, Arc::new(DisabledTableExtractor), processor_config());

    let document = processor
        .process_pages(Path::new("blank.png"), vec![Raster::Gray(text_page(40, 40))])
        .await
        .unwrap();

    assert!(document.text.is_empty());
    assert!(!document.report.all_pages_accepted());
    assert_eq!(document.report.pages[0].final_state, OrchestratorState::Exhausted);
    assert!(document.report.pages[0].recognition_error.is_some());
}

#[tokio::test]
async fn test_missing_document_is_an_input_error() {
    let processor = DocumentProcessor::new(
        Arc::new(WidthEchoEngine),
        Arc::new(DisabledTableExtractor),
        processor_config(),
    );
    let result = processor.process(Path::new("/nonexistent/scan.png")).await;
    assert!(matches!(result, Err(doc_quality::AppError::Input(_))));
}

#[tokio::test]
async fn test_tables_extracted_from_saved_page() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("factura.png");
    text_page(200, 120).save(&path).unwrap();

    let engine = Arc::new(
        ScriptedEngine::new(vec![Reply::text("Concepto Importe", 92.0)]).with_words(vec![
            word(1, 10, 80, "Concepto"),
            word(1, 300, 60, "Importe"),
            word(2, 10, 50, "Papel"),
            word(2, 300, 70, "1.234,50"),
        ]),
    );
    let tables: Arc<dyn TableExtractor> = Arc::new(LayoutTableExtractor::new(
        engine.clone(),
        "spa",
        10 * 1024 * 1024,
    ));
    let config = AppConfig {
        enable_table_extraction: true,
        ..processor_config()
    };

    let document = DocumentProcessor::new(engine, tables, config)
        .process(&path)
        .await
        .unwrap();

    assert_eq!(document.tables.len(), 1);
    assert_eq!(document.report.table_count, 1);
    assert_eq!(document.tables[0].headers, vec!["Concepto", "Importe"]);
    assert_eq!(document.tables[0].rows[0][1], CellValue::Number(1234.5));
}
