//! Hierarchical loader. Walks `{base}/{year}/[{category}/]{file}` and writes each
//! sheet row to `{collection}/{year}/{category}/{condition}/uf/{state_code}`.

use super::Loader;
use crate::config::TreeConfig;
use crate::constants::{STATE_SUBCOLLECTION, TREE_STATE_CODE_COLUMN, TREE_STATE_COLUMN};
use crate::error::Result;
use crate::normalize::slugify_column;
use crate::report::LoadReport;
use crate::sheet::{cell_text, is_blank, read_sheet};
use crate::store::DocPath;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// A spreadsheet found by the walker, with the path segments it maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetFile {
    pub path: PathBuf,
    pub year: String,
    pub category: String,
    pub condition: String,
}

/// Last `_`-separated token of the file stem, lower-cased: `Renda_2020_BAIXA.xlsx` -> `baixa`.
pub fn condition_from_file(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    stem.rsplit('_').next().unwrap_or(stem).to_lowercase()
}

pub fn document_path(root: &DocPath, year: &str, category: &str, condition: &str, state_code: &str) -> DocPath {
    root.clone()
        .child(year)
        .child(category)
        .child(condition)
        .child(STATE_SUBCOLLECTION)
        .child(state_code)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Entries of `dir` in name order.
fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect::<Vec<_>>();
    entries.sort();
    Ok(entries)
}

/// Finds every spreadsheet under `config.base_path`. Year names are taken verbatim;
/// files directly under a year land in the default category.
pub fn discover_sheets(config: &TreeConfig) -> Result<Vec<SheetFile>> {
    let mut found = Vec::new();
    for year_dir in sorted_entries(&config.base_path)? {
        if !year_dir.is_dir() {
            continue;
        }
        let year = file_name(&year_dir);

        let items = match sorted_entries(&year_dir) {
            Ok(items) => items,
            Err(e) => {
                warn!("Skipping unreadable year directory {}: {}", year_dir.display(), e);
                continue;
            }
        };

        for item in items {
            if item.is_file() && has_extension(&item, &config.extensions) {
                found.push(SheetFile {
                    condition: condition_from_file(&file_name(&item)),
                    path: item,
                    year: year.clone(),
                    category: config.default_category.clone(),
                });
            } else if item.is_dir() {
                let category = file_name(&item);
                let files = match sorted_entries(&item) {
                    Ok(files) => files,
                    Err(e) => {
                        warn!("Skipping unreadable category directory {}: {}", item.display(), e);
                        continue;
                    }
                };
                for file in files {
                    if file.is_file() && has_extension(&file, &config.extensions) {
                        found.push(SheetFile {
                            condition: condition_from_file(&file_name(&file)),
                            path: file,
                            year: year.clone(),
                            category: category.clone(),
                        });
                    }
                }
            }
        }
    }
    Ok(found)
}

/// Uploads one sheet. Returns false when the failure policy says to stop.
#[instrument(skip(loader, file, report), fields(file = %file.path.display()))]
pub async fn process_file(loader: &Loader, file: &SheetFile, report: &mut LoadReport) -> bool {
    let name = file_name(&file.path);
    info!("📄 Reading {}", name);

    let mut sheet = match read_sheet(&file.path) {
        Ok(sheet) => sheet,
        Err(e) => {
            report.files_skipped += 1;
            return loader.keep_going(report, format!("Failed to read {}: {}", name, e));
        }
    };
    sheet.rename_headers(slugify_column);

    let (state_col, code_col) = match (
        sheet.column_index(TREE_STATE_COLUMN),
        sheet.column_index(TREE_STATE_CODE_COLUMN),
    ) {
        (Some(s), Some(c)) => (s, c),
        _ => {
            let message = format!(
                "Required columns '{}'/'{}' missing in {}",
                TREE_STATE_COLUMN, TREE_STATE_CODE_COLUMN, name
            );
            warn!("⚠️ {}", message);
            report.record_error(message);
            report.files_skipped += 1;
            return true;
        }
    };
    report.files_read += 1;

    let root = loader.root();
    for i in 0..sheet.len() {
        if is_blank(sheet.cell(i, state_col)) || is_blank(sheet.cell(i, code_col)) {
            debug!("Dropping row {} of {}: missing state", i, name);
            continue;
        }
        report.rows_read += 1;

        let state_code = cell_text(sheet.cell(i, code_col)).trim().to_string();
        let path = document_path(&root, &file.year, &file.category, &file.condition, &state_code);
        match loader.set(&path, &sheet.row_map(i)).await {
            Ok(()) => {
                report.rows_written += 1;
                debug!("Wrote {}", path);
            }
            Err(e) => {
                report.rows_failed += 1;
                let message = format!("Failed to send {} from {}: {}", state_code, name, e);
                if !loader.keep_going(report, message) {
                    return false;
                }
            }
        }
    }

    info!("✅ Sent {}", name);
    true
}

/// Walks the tree and uploads every sheet found.
#[instrument(skip_all)]
pub async fn run_tree(loader: &Loader, config: &TreeConfig) -> Result<LoadReport> {
    let mut report = LoadReport::start("tree");
    info!(run_id = %report.run_id, "Starting tree load from {}", config.base_path.display());

    let files = discover_sheets(config)?;
    info!("Found {} spreadsheets", files.len());
    println!("📂 Found {} spreadsheets under {}", files.len(), config.base_path.display());

    for file in &files {
        if !process_file(loader, file, &mut report).await {
            break;
        }
    }

    info!(
        written = report.rows_written,
        failed = report.rows_failed,
        skipped_files = report.files_skipped,
        "✅ Tree load finished"
    );
    Ok(report.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_from_file() {
        assert_eq!(condition_from_file("Renda_2020_BAIXA.xlsx"), "baixa");
        assert_eq!(condition_from_file("Geral.xlsx"), "geral");
        assert_eq!(condition_from_file("a_b_Média.csv"), "média");
    }

    #[test]
    fn test_document_path() {
        let root = DocPath::collection("dados");
        let path = document_path(&root, "2020", "Renda", &condition_from_file("Renda_2020_BAIXA.xlsx"), "SP");
        assert_eq!(path.to_string(), "dados/2020/Renda/baixa/uf/SP");
    }

    #[test]
    fn test_has_extension_is_case_insensitive() {
        let exts = vec!["xlsx".to_string()];
        assert!(has_extension(Path::new("a/Renda_ALTA.XLSX"), &exts));
        assert!(!has_extension(Path::new("a/notas.txt"), &exts));
        assert!(!has_extension(Path::new("a/sem_extensao"), &exts));
    }
}
