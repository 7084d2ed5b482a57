//! # Table Extraction
//!
//! Tables are recovered from the word layout the recognition engine reports.
//! Consecutive text lines that split into at least two well separated column
//! clusters form a table; its first line supplies the headers.
//!
//! Extraction is independent of the quality loop. It runs once per document
//! and any failure degrades to "no tables".

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::document::load_pages;
use crate::ocr_config::DEFAULT_DPI;
use crate::ocr_errors::TableError;
use crate::recognition::{RecognitionEngine, WordBox};

/// Horizontal gap in pixels that separates two columns.
pub const DEFAULT_MIN_COLUMN_GAP: u32 = 40;

/// Value of one table cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    Text(String),
    Number(f64),
    Empty,
}

impl CellValue {
    /// Interprets raw cell text, recognizing numbers written with either
    /// decimal convention (`1,234.50` or `1.234,50`) and common currency or
    /// percent signs.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return CellValue::Empty;
        }
        match parse_number(trimmed) {
            Some(number) => CellValue::Number(number),
            None => CellValue::Text(trimmed.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Text(text) => write!(f, "{}", text),
            CellValue::Number(number) => write!(f, "{}", number),
            CellValue::Empty => Ok(()),
        }
    }
}

fn parse_number(text: &str) -> Option<f64> {
    let stripped = text
        .trim_start_matches(['$', '€', '£', '+'])
        .trim_end_matches(['$', '€', '£', '%'])
        .trim();
    let (negative, digits) = match stripped.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, stripped),
    };
    if digits.is_empty()
        || !digits.starts_with(|c: char| c.is_ascii_digit())
        || !digits.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',')
    {
        return None;
    }

    let last_dot = digits.rfind('.');
    let last_comma = digits.rfind(',');
    let normalized = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) if comma > dot => digits.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => digits.replace(',', ""),
        (None, Some(comma)) => {
            // A lone comma with one or two trailing digits is a decimal comma
            let decimals = digits.len() - comma - 1;
            if digits.matches(',').count() == 1 && (1..=2).contains(&decimals) {
                digits.replace(',', ".")
            } else {
                digits.replace(',', "")
            }
        }
        (Some(_), None) if digits.matches('.').count() > 1 => digits.replace('.', ""),
        _ => digits.to_string(),
    };

    let value: f64 = normalized.parse().ok()?;
    Some(if negative { -value } else { value })
}

/// A rectangular table: every row has one cell per header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Table {
    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    pub fn is_rectangular(&self) -> bool {
        self.rows.iter().all(|row| row.len() == self.headers.len())
    }

    /// Renders the table as a pipe-delimited text grid.
    pub fn to_pipe_text(&self) -> String {
        let render = |cells: Vec<String>| format!("| {} |", cells.join(" | "));
        let mut lines = vec![
            render(self.headers.clone()),
            render(vec!["---".to_string(); self.headers.len()]),
        ];
        lines.extend(
            self.rows
                .iter()
                .map(|row| render(row.iter().map(|cell| cell.to_string()).collect())),
        );
        lines.join("\n")
    }
}

/// Produces the tables of a source document.
pub trait TableExtractor: Send + Sync {
    fn extract_tables(&self, source: &Path) -> Result<Vec<Table>, TableError>;
}

/// Runs an extractor and turns any failure into an empty list.
pub fn extract_or_empty(extractor: &dyn TableExtractor, source: &Path) -> Vec<Table> {
    match extractor.extract_tables(source) {
        Ok(tables) => tables,
        Err(e) => {
            warn!(
                error = %e,
                source = %source.display(),
                "Table extraction failed, continuing without tables"
            );
            Vec::new()
        }
    }
}

/// Extractor used when table extraction is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledTableExtractor;

impl TableExtractor for DisabledTableExtractor {
    fn extract_tables(&self, _source: &Path) -> Result<Vec<Table>, TableError> {
        Ok(Vec::new())
    }
}

/// Builds tables from recognized word boxes.
pub struct LayoutTableExtractor {
    engine: Arc<dyn RecognitionEngine>,
    language: String,
    min_column_gap: u32,
    max_file_size: u64,
    dpi: u32,
}

/// A run of words on one line with no column gap between them.
#[derive(Debug, Clone)]
struct Cell {
    text: String,
    left: u32,
    right: u32,
}

impl Cell {
    fn center(&self) -> f32 {
        (self.left + self.right) as f32 / 2.0
    }
}

impl LayoutTableExtractor {
    pub fn new(engine: Arc<dyn RecognitionEngine>, language: &str, max_file_size: u64) -> Self {
        Self {
            engine,
            language: language.to_string(),
            min_column_gap: DEFAULT_MIN_COLUMN_GAP,
            max_file_size,
            dpi: DEFAULT_DPI,
        }
    }

    /// Resolution used when rasterizing PDF sources.
    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    pub fn with_min_column_gap(mut self, gap: u32) -> Self {
        self.min_column_gap = gap;
        self
    }

    /// Groups the words of one page into tables.
    pub fn tables_from_words(&self, words: &[WordBox]) -> Vec<Table> {
        let lines = self.split_lines(words);

        let mut tables = Vec::new();
        let mut run: Vec<Vec<Cell>> = Vec::new();
        for cells in lines {
            if cells.len() >= 2 {
                run.push(cells);
                continue;
            }
            if run.len() >= 2 {
                tables.push(build_table(&run));
            }
            run.clear();
        }
        if run.len() >= 2 {
            tables.push(build_table(&run));
        }

        debug!(
            words = words.len(),
            tables = tables.len(),
            "Layout table detection finished"
        );
        tables
    }

    /// Lines in reading order, each split into cells at column gaps.
    fn split_lines(&self, words: &[WordBox]) -> Vec<Vec<Cell>> {
        let mut lines: Vec<((u32, u32, u32), Vec<&WordBox>)> = Vec::new();
        for word in words {
            match lines.iter_mut().find(|(key, _)| *key == word.line_key()) {
                Some((_, members)) => members.push(word),
                None => lines.push((word.line_key(), vec![word])),
            }
        }
        lines.sort_by_key(|(_, members)| members.iter().map(|w| w.top).min().unwrap_or(0));

        lines
            .into_iter()
            .map(|(_, mut members)| {
                members.sort_by_key(|w| w.left);
                let mut cells: Vec<Cell> = Vec::new();
                for word in members {
                    match cells.last_mut() {
                        Some(cell) if word.left < cell.right + self.min_column_gap => {
                            cell.text.push(' ');
                            cell.text.push_str(&word.text);
                            cell.right = cell.right.max(word.right());
                        }
                        _ => cells.push(Cell {
                            text: word.text.clone(),
                            left: word.left,
                            right: word.right(),
                        }),
                    }
                }
                cells
            })
            .collect()
    }
}

/// Aligns every row of a run onto the columns of its first line.
fn build_table(run: &[Vec<Cell>]) -> Table {
    let header = &run[0];
    let headers: Vec<String> = header.iter().map(|cell| cell.text.clone()).collect();

    let rows: Vec<Vec<CellValue>> = run[1..]
        .iter()
        .map(|cells| {
            let mut texts: Vec<Vec<&str>> = vec![Vec::new(); header.len()];
            for cell in cells {
                let column = nearest_column(header, cell);
                texts[column].push(&cell.text);
            }
            texts
                .into_iter()
                .map(|parts| CellValue::parse(&parts.join(" ")))
                .collect::<Vec<CellValue>>()
        })
        .collect();

    Table { headers, rows }
}

/// Column whose header overlaps the cell most, or whose center is nearest.
fn nearest_column(header: &[Cell], cell: &Cell) -> usize {
    let overlap = |column: &Cell| {
        let start = column.left.max(cell.left);
        let end = column.right.min(cell.right);
        end.saturating_sub(start)
    };

    let best_overlap = header
        .iter()
        .enumerate()
        .max_by_key(|(_, column)| overlap(column))
        .filter(|(_, column)| overlap(column) > 0)
        .map(|(index, _)| index);

    best_overlap.unwrap_or_else(|| {
        header
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                let da = (a.center() - cell.center()).abs();
                let db = (b.center() - cell.center()).abs();
                da.total_cmp(&db)
            })
            .map(|(index, _)| index)
            .unwrap_or(0)
    })
}

impl TableExtractor for LayoutTableExtractor {
    fn extract_tables(&self, source: &Path) -> Result<Vec<Table>, TableError> {
        let pages = load_pages(source, self.max_file_size, self.dpi)
            .map_err(|e| TableError::Unreadable(e.to_string()))?;

        let mut tables = Vec::new();
        for page in &pages {
            let words = self.engine.word_boxes(page, &self.language)?;
            tables.extend(self.tables_from_words(&words));
        }
        Ok(tables)
    }
}
