use crate::error::{LoaderError, Result};
use calamine::{open_workbook_auto, Data, Reader};
use serde_json::{Map, Number, Value};
use std::path::Path;
use tracing::debug;

/// A spreadsheet loaded into memory: header row plus data rows.
/// Cells are JSON values; empty cells are `Value::Null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Sheet {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { headers, rows }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cell at (row, column); short rows read as empty.
    pub fn cell(&self, row: usize, column: usize) -> &Value {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(&Value::Null)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rewrites every header with `f`.
    pub fn rename_headers<F: Fn(&str) -> String>(&mut self, f: F) {
        self.headers = self.headers.iter().map(|h| f(h.as_str())).collect();
    }

    /// Row as a header -> value map. Later duplicates of a header win.
    pub fn row_map(&self, row: usize) -> Map<String, Value> {
        self.headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), self.cell(row, i).clone()))
            .collect()
    }
}

/// True when the cell holds nothing usable (null or blank text).
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Renders a cell as text the way it would show in the sheet.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Reads the first worksheet of `path`. The extension picks the reader:
/// workbooks go through calamine, `.csv` through the csv crate.
pub fn read_sheet(path: &Path) -> Result<Sheet> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let sheet = match ext.as_str() {
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_workbook(path)?,
        "csv" => read_csv(path)?,
        other => {
            return Err(LoaderError::UnsupportedFormat(format!(
                "{} ({})",
                path.display(),
                if other.is_empty() { "no extension" } else { other }
            )))
        }
    };

    debug!(
        "Read {} rows x {} columns from {}",
        sheet.rows.len(),
        sheet.headers.len(),
        path.display()
    );
    Ok(sheet)
}

fn read_workbook(path: &Path) -> Result<Sheet> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| LoaderError::NoWorksheet(path.display().to_string()))??;

    let mut rows = range.rows();
    let headers = match rows.next() {
        Some(header_row) => header_names(header_row.iter().map(|c| cell_text(&workbook_cell(c)))),
        None => return Ok(Sheet::default()),
    };
    let rows = rows
        .map(|row| row.iter().map(workbook_cell).collect())
        .collect();

    Ok(Sheet::new(headers, rows))
}

/// Blank headers get a positional `Unnamed: {i}` name and repeated headers a
/// `.{n}` suffix, so every column keeps its own non-empty key.
fn header_names<I: IntoIterator<Item = String>>(raw: I) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for (i, header) in raw.into_iter().enumerate() {
        let base = if header.trim().is_empty() {
            format!("Unnamed: {}", i)
        } else {
            header
        };
        let mut name = base.clone();
        let mut n = 1;
        while names.contains(&name) {
            name = format!("{}.{}", base, n);
            n += 1;
        }
        names.push(name);
    }
    names
}

fn workbook_cell(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::Int(i) => Value::from(*i),
        Data::Float(f) => float_value(*f),
        Data::Bool(b) => Value::Bool(*b),
        Data::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    }
}

/// Workbooks store every number as a float; whole numbers come back as integers.
fn float_value(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Value::from(f as i64)
    } else {
        Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn read_csv(path: &Path) -> Result<Sheet> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let headers = header_names(reader.headers()?.iter().map(|h| h.to_string()));
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(csv_cell).collect());
    }

    Ok(Sheet::new(headers, rows))
}

fn csv_cell(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Null;
    }
    if let Ok(i) = raw.trim().parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = raw.trim().parse::<f64>() {
        if f.is_finite() {
            return float_value(f);
        }
    }
    Value::String(raw.to_string())
}
