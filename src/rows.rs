//! Row source: turns an uploaded spreadsheet into ordered records.
//!
//! The first non-empty row is the header row; every later row becomes one
//! [`Record`] keyed by header. Empty cells are left out of the record and
//! rows without a single value are skipped.

use calamine::{open_workbook_auto, Data, Reader};
use chrono::Timelike;
use log::debug;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::SlipError;

/// One employee's data for one document.
pub type Record = Map<String, Value>;

/// Upload formats the row source understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabularFormat {
    /// Any workbook calamine can open (xlsx, xlsm, xlsb, xls, ods).
    Workbook,
    Csv,
}

impl TabularFormat {
    /// Classify by extension alone. Content is never touched here.
    pub fn from_filename(filename: &str) -> Result<Self, SlipError> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(Self::Workbook),
            "csv" => Ok(Self::Csv),
            _ => Err(SlipError::UnsupportedFormat(filename.to_string())),
        }
    }
}

/// Read records on the blocking pool.
pub async fn load_rows(path: PathBuf, format: TabularFormat) -> Result<Vec<Record>, SlipError> {
    tokio::task::spawn_blocking(move || read_rows(&path, format))
        .await
        .map_err(|e| SlipError::InvalidInput(format!("row reader task failed: {e}")))?
}

/// Read every record of the file. Fails with `EmptyBatch` when no rows remain.
pub fn read_rows(path: &Path, format: TabularFormat) -> Result<Vec<Record>, SlipError> {
    let grid = match format {
        TabularFormat::Workbook => read_workbook(path)?,
        TabularFormat::Csv => read_csv(path)?,
    };

    let records = grid_to_records(grid);
    debug!("Parsed {} record(s) from {:?}", records.len(), path);

    if records.is_empty() {
        return Err(SlipError::EmptyBatch);
    }
    Ok(records)
}

type Grid = Vec<Vec<Option<Value>>>;

fn read_workbook(path: &Path) -> Result<Grid, SlipError> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| SlipError::InvalidInput(e.to_string()))?;

    let first_sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| SlipError::InvalidInput("workbook has no sheets".to_string()))?;

    let range = workbook
        .worksheet_range(&first_sheet)
        .map_err(|e| SlipError::InvalidInput(e.to_string()))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(workbook_cell).collect())
        .collect())
}

fn workbook_cell(cell: &Data) -> Option<Value> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| Value::String(trimmed.to_string()))
        }
        Data::Int(i) => Some(Value::from(*i)),
        Data::Float(f) => number_value(*f),
        Data::Bool(b) => Some(Value::Bool(*b)),
        Data::DateTime(dt) => dt.as_datetime().map(|dt| {
            let text = if dt.num_seconds_from_midnight() == 0 {
                dt.format("%Y-%m-%d").to_string()
            } else {
                dt.format("%Y-%m-%d %H:%M:%S").to_string()
            };
            Value::String(text)
        }),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(Value::String(s.clone())),
    }
}

fn read_csv(path: &Path) -> Result<Grid, SlipError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| SlipError::InvalidInput(e.to_string()))?;

    let mut grid = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| SlipError::InvalidInput(e.to_string()))?;
        grid.push(row.iter().map(csv_cell).collect());
    }
    Ok(grid)
}

/// CSV has no cell types, so numbers and booleans are inferred from text.
fn csv_cell(raw: &str) -> Option<Value> {
    let text = raw.trim().trim_start_matches('\u{feff}').trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::from(i));
    }
    if let Ok(f) = text.parse::<f64>() {
        if f.is_finite() {
            return number_value(f);
        }
    }
    match text.to_lowercase().as_str() {
        "true" => Some(Value::Bool(true)),
        "false" => Some(Value::Bool(false)),
        _ => Some(Value::String(text.to_string())),
    }
}

/// Integral floats become integers so they print as `1000`, not `1000.0`.
pub(crate) fn number_value(f: f64) -> Option<Value> {
    if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
        Some(Value::from(f as i64))
    } else {
        Number::from_f64(f).map(Value::Number)
    }
}

fn header_name(cell: &Option<Value>) -> Option<String> {
    let name = match cell {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
        None => return None,
    };
    (!name.is_empty()).then_some(name)
}

fn grid_to_records(grid: Grid) -> Vec<Record> {
    let mut rows = grid
        .into_iter()
        .skip_while(|row| row.iter().all(Option::is_none));

    let Some(header_row) = rows.next() else {
        return Vec::new();
    };

    // Repeated headers get `_1`, `_2`, ... so no column is silently lost.
    let mut seen: HashMap<String, usize> = HashMap::new();
    let headers: Vec<Option<String>> = header_row
        .iter()
        .map(|cell| {
            header_name(cell).map(|name| {
                let count = seen.entry(name.clone()).or_insert(0);
                let unique = if *count == 0 {
                    name
                } else {
                    format!("{name}_{count}")
                };
                *count += 1;
                unique
            })
        })
        .collect();

    rows.filter_map(|row| {
        let record: Record = row
            .into_iter()
            .zip(headers.iter())
            .filter_map(|(cell, header)| Some((header.clone()?, cell?)))
            .collect();
        (!record.is_empty()).then_some(record)
    })
    .collect()
}
