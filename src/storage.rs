//! # Result Storage
//!
//! Persists processed documents to the output directory. Every file is first
//! written to a temporary file in the same directory and then renamed into
//! place, so readers never observe a partially written result.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::document::ProcessedDocument;
use crate::errors::error_logging::log_storage_error;
use crate::errors::{AppError, AppResult};

/// Paths written for one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredPaths {
    pub text: PathBuf,
    pub report: PathBuf,
    pub tables: Vec<PathBuf>,
    pub tables_text: Option<PathBuf>,
    pub original: PathBuf,
}

impl StoredPaths {
    pub fn all(&self) -> Vec<&Path> {
        let mut paths = vec![self.text.as_path(), self.report.as_path()];
        paths.extend(self.tables.iter().map(PathBuf::as_path));
        paths.extend(self.tables_text.as_deref());
        paths.push(self.original.as_path());
        paths
    }
}

/// Destination for processed documents.
pub trait ResultStore: Send + Sync {
    /// Stores the results of `document`, which was read from `original`.
    fn save(&self, document: &ProcessedDocument, original: &Path) -> AppResult<StoredPaths>;
}

/// Writes results as plain files under one directory.
#[derive(Debug, Clone)]
pub struct FileResultStore {
    output_dir: PathBuf,
}

impl FileResultStore {
    /// Creates the store, creating `output_dir` if needed.
    pub fn new(output_dir: impl Into<PathBuf>) -> AppResult<Self> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir).map_err(|e| {
            storage_error(&e, "create_output_dir", &output_dir)
        })?;
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn write_atomic(&self, file_name: &str, contents: &[u8]) -> AppResult<PathBuf> {
        let target = self.output_dir.join(file_name);
        let mut temp = NamedTempFile::new_in(&self.output_dir)
            .map_err(|e| storage_error(&e, "create_temp_file", &target))?;
        temp.write_all(contents)
            .and_then(|_| temp.flush())
            .map_err(|e| storage_error(&e, "write", &target))?;
        temp.persist(&target)
            .map_err(|e| storage_error(&e.error, "persist", &target))?;
        debug!(path = %target.display(), bytes = contents.len(), "Wrote result file");
        Ok(target)
    }

    fn write_json<T: Serialize>(&self, file_name: &str, value: &T) -> AppResult<PathBuf> {
        let json = serde_json::to_vec_pretty(value).map_err(|e| {
            let err = AppError::from(e);
            log_storage_error(&err, "serialize", Some(file_name));
            err
        })?;
        self.write_atomic(file_name, &json)
    }
}

fn storage_error(error: &impl std::fmt::Display, operation: &str, path: &Path) -> AppError {
    let path = path.display().to_string();
    log_storage_error(error, operation, Some(&path));
    AppError::Storage(format!("{} failed for {}: {}", operation, path, error))
}

impl ResultStore for FileResultStore {
    fn save(&self, document: &ProcessedDocument, original: &Path) -> AppResult<StoredPaths> {
        let stem = original
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AppError::Input(format!("cannot derive an output name from {}", original.display()))
            })?;

        let text = self.write_atomic(&format!("{}.txt", stem), document.text.as_bytes())?;
        let report = self.write_json(&format!("{}_report.json", stem), &document.report)?;

        let mut tables = Vec::with_capacity(document.tables.len());
        for (index, table) in document.tables.iter().enumerate() {
            tables.push(self.write_json(&format!("{}_table_{}.json", stem, index + 1), table)?);
        }
        let tables_text = if document.tables.is_empty() {
            None
        } else {
            let rendered = document
                .tables
                .iter()
                .map(|table| table.to_pipe_text())
                .collect::<Vec<_>>()
                .join("\n\n");
            Some(self.write_atomic(&format!("{}_tables.txt", stem), rendered.as_bytes())?)
        };

        let original_name = original
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(stem);
        let original_bytes =
            std::fs::read(original).map_err(|e| storage_error(&e, "read_original", original))?;
        let original_copy = self.write_atomic(original_name, &original_bytes)?;

        info!(
            output_dir = %self.output_dir.display(),
            stem = %stem,
            tables = tables.len(),
            "Stored document results"
        );

        Ok(StoredPaths {
            text,
            report,
            tables,
            tables_text,
            original: original_copy,
        })
    }
}
