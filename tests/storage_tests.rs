//! Integration tests for result persistence

mod common;

use std::sync::Arc;

use common::{text_page, word, Reply, ScriptedEngine};
use doc_quality::config::AppConfig;
use doc_quality::document::{DocumentProcessor, DocumentReport, ProcessedDocument};
use doc_quality::ocr_config::EnhancementConfig;
use doc_quality::storage::{FileResultStore, ResultStore};
use doc_quality::tables::{LayoutTableExtractor, Table};
use tempfile::tempdir;

async fn processed_invoice(input: &std::path::Path) -> ProcessedDocument {
    let engine = Arc::new(
        ScriptedEngine::new(vec![Reply::text(
            "factura de 1a empresa. contacto: ana@example.com",
            88.0,
        )])
        .with_words(vec![
            word(1, 10, 80, "Concepto"),
            word(1, 300, 60, "Importe"),
            word(2, 10, 50, "Papel"),
            word(2, 300, 70, "1.234,50"),
            word(3, 10, 45, "Tinta"),
            word(3, 300, 50, "12,00"),
        ]),
    );
    let tables = Arc::new(LayoutTableExtractor::new(engine.clone(), "spa", 10 * 1024 * 1024));
    let config = AppConfig {
        enhancement: EnhancementConfig::passthrough(),
        worker_threads: 1,
        enable_table_extraction: true,
        ..AppConfig::default()
    };

    DocumentProcessor::new(engine, tables, config)
        .process(input)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_save_writes_every_artifact() {
    let input_dir = tempdir().unwrap();
    let output_dir = tempdir().unwrap();
    let input = input_dir.path().join("factura.png");
    text_page(160, 100).save(&input).unwrap();

    let document = processed_invoice(&input).await;
    let store = FileResultStore::new(output_dir.path()).unwrap();
    let paths = store.save(&document, &input).unwrap();

    assert_eq!(paths.text, output_dir.path().join("factura.txt"));
    assert_eq!(paths.report, output_dir.path().join("factura_report.json"));
    assert_eq!(paths.tables, vec![output_dir.path().join("factura_table_1.json")]);
    assert_eq!(paths.tables_text, Some(output_dir.path().join("factura_tables.txt")));
    assert_eq!(paths.original, output_dir.path().join("factura.png"));
    for path in paths.all() {
        assert!(path.is_file(), "{} missing", path.display());
    }

    let text = std::fs::read_to_string(&paths.text).unwrap();
    assert_eq!(text, "Factura de la empresa. Contacto: ana@example.com");

    let original = std::fs::read(&input).unwrap();
    assert_eq!(std::fs::read(&paths.original).unwrap(), original);
}

#[tokio::test]
async fn test_report_and_tables_round_trip_as_json() {
    let input_dir = tempdir().unwrap();
    let output_dir = tempdir().unwrap();
    let input = input_dir.path().join("ticket.png");
    text_page(160, 100).save(&input).unwrap();

    let document = processed_invoice(&input).await;
    let paths = FileResultStore::new(output_dir.path())
        .unwrap()
        .save(&document, &input)
        .unwrap();

    let report: DocumentReport =
        serde_json::from_str(&std::fs::read_to_string(&paths.report).unwrap()).unwrap();
    assert_eq!(report, document.report);
    assert_eq!(report.table_count, 1);
    assert_eq!(report.structured_data.emails, vec!["ana@example.com"]);
    assert!(report.all_pages_accepted());

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&paths.report).unwrap()).unwrap();
    assert!(raw["processed_at"].is_string());
    assert_eq!(raw["pages"][0]["attempts"], 1);

    let table: Table =
        serde_json::from_str(&std::fs::read_to_string(&paths.tables[0]).unwrap()).unwrap();
    assert_eq!(table, document.tables[0]);
    assert_eq!(table.rows.len(), 2);

    let rendered = std::fs::read_to_string(paths.tables_text.unwrap()).unwrap();
    assert!(rendered.starts_with("| Concepto | Importe |"));
    assert!(rendered.contains("| Papel | 1234.5 |"));
}

#[test]
fn test_document_without_tables_writes_no_table_files() {
    let input_dir = tempdir().unwrap();
    let output_dir = tempdir().unwrap();
    let input = input_dir.path().join("carta.png");
    text_page(80, 60).save(&input).unwrap();

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut document = runtime.block_on(processed_invoice(&input));
    document.tables.clear();

    let paths = FileResultStore::new(output_dir.path())
        .unwrap()
        .save(&document, &input)
        .unwrap();
    assert!(paths.tables.is_empty());
    assert!(paths.tables_text.is_none());
    assert!(!output_dir.path().join("carta_tables.txt").exists());
}

#[test]
fn test_missing_original_is_a_storage_error() {
    let input_dir = tempdir().unwrap();
    let output_dir = tempdir().unwrap();
    let input = input_dir.path().join("scan.png");
    text_page(80, 60).save(&input).unwrap();

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let document = runtime.block_on(processed_invoice(&input));
    std::fs::remove_file(&input).unwrap();

    let result = FileResultStore::new(output_dir.path())
        .unwrap()
        .save(&document, &input);
    assert!(matches!(result, Err(doc_quality::AppError::Storage(_))));
}
