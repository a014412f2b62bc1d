//! Flat loader: one spreadsheet per demographic dimension, unioned into a
//! single table and written to the flat collection.

use super::Loader;
use crate::config::{DimensionSpec, FlatConfig};
use crate::constants::*;
use crate::error::{LoaderError, Result};
use crate::normalize::normalize_text;
use crate::report::LoadReport;
use crate::sheet::{cell_text, read_sheet, Sheet};
use crate::store::Fields;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info, instrument};

/// One row of the flat table. Every dimension table produces the same shape;
/// demographic fields it does not own stay empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionRow {
    pub ano: i64,
    pub uf: String,
    pub admissoes: i64,
    pub desligamentos: i64,
    pub saldo: i64,
    pub sexo: String,
    pub bolsa_familia: String,
    pub situacao_pobreza: String,
    pub setor_economico: String,
    pub raca_cor: String,
    pub grau_instrucao: String,
    pub faixa_etaria: String,
    pub cad_unico: String,
    pub categoria: String,
}

impl DimensionRow {
    pub fn demographic_mut(&mut self, field: &str) -> Option<&mut String> {
        let slot = match field {
            FIELD_SEX => &mut self.sexo,
            FIELD_WELFARE => &mut self.bolsa_familia,
            FIELD_POVERTY => &mut self.situacao_pobreza,
            FIELD_SECTOR => &mut self.setor_economico,
            FIELD_RACE => &mut self.raca_cor,
            FIELD_EDUCATION => &mut self.grau_instrucao,
            FIELD_AGE => &mut self.faixa_etaria,
            FIELD_REGISTRY => &mut self.cad_unico,
            FIELD_CATEGORY => &mut self.categoria,
            _ => return None,
        };
        Some(slot)
    }

    pub fn to_fields(&self) -> Result<Fields> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(LoaderError::Json(<serde_json::Error as serde::ser::Error>::custom(format!(
                "row serialized to {}, expected an object",
                other
            )))),
        }
    }

    /// SHA-256 of the row's JSON. Keys serialize in sorted order, so equal rows hash equal.
    pub fn content_id(&self) -> Result<String> {
        let json = serde_json::to_vec(&self.to_fields()?)?;
        Ok(hex::encode(Sha256::digest(&json)))
    }
}

/// Integer coercion for the count columns: empty is 0, floats truncate,
/// numeric text parses, anything else is 0.
pub fn coerce_int(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
                .unwrap_or(0)
        }
        Value::Bool(b) => i64::from(*b),
        _ => 0,
    }
}

fn int_column(sheet: &Sheet, row: usize, column: Option<usize>) -> i64 {
    column.map(|c| coerce_int(sheet.cell(row, c))).unwrap_or(0)
}

/// Normalized text of a cell; empty cells become "".
fn normalized_text(value: &Value) -> String {
    cell_text(&normalize_text(value)).trim().to_string()
}

/// Reshapes one dimension sheet into flat rows.
pub fn shape_dimension(sheet: &Sheet, spec: &DimensionSpec) -> Result<Vec<DimensionRow>> {
    let source = match (&spec.constant, spec.source_column.as_deref()) {
        (Some(_), _) => None,
        (None, Some(column)) => Some(sheet.column_index(column).ok_or_else(|| {
            LoaderError::MissingColumn {
                column: column.to_string(),
                file: spec.file.clone(),
            }
        })?),
        (None, None) => {
            return Err(LoaderError::Config(format!(
                "Dimension '{}' has neither source_column nor constant",
                spec.field
            )))
        }
    };

    let year = sheet.column_index(SOURCE_YEAR);
    let state = sheet.column_index(SOURCE_STATE);
    let admissions = sheet.column_index(SOURCE_ADMISSIONS);
    let terminations = sheet.column_index(SOURCE_TERMINATIONS);
    let balance = sheet.column_index(SOURCE_BALANCE);

    let mut rows = Vec::with_capacity(sheet.len());
    for i in 0..sheet.len() {
        let mut row = DimensionRow {
            ano: int_column(sheet, i, year),
            uf: state.map(|c| normalized_text(sheet.cell(i, c))).unwrap_or_default(),
            admissoes: int_column(sheet, i, admissions),
            desligamentos: int_column(sheet, i, terminations),
            saldo: int_column(sheet, i, balance),
            ..Default::default()
        };

        let value = match (&spec.constant, source) {
            (Some(constant), _) => constant.clone(),
            (None, Some(c)) => normalized_text(sheet.cell(i, c)),
            (None, None) => String::new(),
        };
        let slot = row.demographic_mut(&spec.field).ok_or_else(|| {
            LoaderError::Config(format!("Unknown dimension field '{}'", spec.field))
        })?;
        *slot = value;
        rows.push(row);
    }
    Ok(rows)
}

/// Reads `spec.file` under `base` and reshapes it.
#[instrument(skip(spec), fields(field = %spec.field, file = %spec.file))]
pub fn load_dimension(base: &Path, spec: &DimensionSpec) -> Result<Vec<DimensionRow>> {
    let path = base.join(&spec.file);
    info!("📄 Reading {}", path.display());
    let sheet = read_sheet(&path)?;
    debug!("Available columns: {:?}", sheet.headers);
    shape_dimension(&sheet, spec)
}

/// Row-wise union of all dimension tables, in order.
pub fn concat(tables: Vec<Vec<DimensionRow>>) -> Vec<DimensionRow> {
    tables.into_iter().flatten().collect()
}

/// Loads every configured dimension and writes the union to the flat collection.
#[instrument(skip_all, fields(idempotent = config.idempotent))]
pub async fn run_flat(loader: &Loader, config: &FlatConfig) -> Result<LoadReport> {
    let mut report = LoadReport::start("flat");
    info!(run_id = %report.run_id, "Starting flat load from {}", config.base_path.display());

    let mut tables = Vec::with_capacity(config.dimensions.len());
    for spec in &config.dimensions {
        match load_dimension(&config.base_path, spec) {
            Ok(rows) => {
                report.files_read += 1;
                tables.push(rows);
            }
            Err(e) => {
                report.files_skipped += 1;
                if !loader.keep_going(&mut report, format!("Failed to load {}: {}", spec.file, e)) {
                    return Ok(report.finish());
                }
            }
        }
    }

    let rows = concat(tables);
    report.rows_read = rows.len();
    info!("📤 Sending {} documents to {}", rows.len(), loader.collection);
    println!("📤 Sending {} documents to {}...", rows.len(), loader.collection);

    let collection = loader.root();
    for row in &rows {
        let outcome = match row.to_fields() {
            Ok(fields) if config.idempotent => match row.content_id() {
                Ok(id) => loader.set(&collection.clone().child(&id), &fields).await,
                Err(e) => Err(e),
            },
            Ok(fields) => loader.create(&collection, &fields).await.map(|_| ()),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => report.rows_written += 1,
            Err(e) => {
                report.rows_failed += 1;
                let message = format!("Failed to write {} row for {} ({}): {}", row.ano, row.uf, loader.collection, e);
                if !loader.keep_going(&mut report, message) {
                    break;
                }
            }
        }
    }

    info!(
        written = report.rows_written,
        failed = report.rows_failed,
        "✅ Flat load finished"
    );
    Ok(report.finish())
}
