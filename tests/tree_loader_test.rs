use anyhow::Result;
use async_trait::async_trait;
use painel_loader::config::{Config, FailurePolicy};
use painel_loader::error::LoaderError;
use painel_loader::pipeline::tree::discover_sheets;
use painel_loader::pipeline::{run_tree, Loader};
use painel_loader::store::{DocPath, DocumentStore, Fields, InMemoryStore};
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::tempdir;

const RENDA_BAIXA: &str = "UF,Sigla UF,Admissões,Saldo\nSão Paulo,SP,100,20\nAcre, AC ,5,-1\n,RJ,7,7\nBahia,,1,1\n";

fn write(dir: &Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn test_config(base: &Path) -> Config {
    let mut config = Config::default();
    config.limits.writes_per_minute = 0;
    config.tree.base_path = base.to_path_buf();
    config.tree.extensions = vec!["csv".to_string()];
    config
}

/// Fails every write whose path ends with the given state code.
struct FailingStore {
    inner: InMemoryStore,
    fail_code: &'static str,
    attempts: AtomicUsize,
}

#[async_trait]
impl DocumentStore for FailingStore {
    async fn create(&self, collection: &DocPath, fields: &Fields) -> painel_loader::error::Result<DocPath> {
        self.inner.create(collection, fields).await
    }

    async fn set(&self, document: &DocPath, fields: &Fields) -> painel_loader::error::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if document.segments().last().map(|s| s.as_str()) == Some(self.fail_code) {
            return Err(LoaderError::Store { status: 429, body: "quota exceeded".into() });
        }
        self.inner.set(document, fields).await
    }
}

#[tokio::test]
async fn test_category_file_lands_at_expected_path() -> Result<()> {
    let dir = tempdir()?;
    write(dir.path(), "2020/Renda/Renda_2020_BAIXA.csv", RENDA_BAIXA);
    let config = test_config(dir.path());
    let store = InMemoryStore::new();
    let loader = Loader::new(Arc::new(store.clone()), &config);

    let report = run_tree(&loader, &config.tree).await?;
    assert_eq!(report.files_read, 1);
    assert_eq!(report.rows_written, 2);

    let sp = DocPath::collection("dados")
        .child("2020")
        .child("Renda")
        .child("baixa")
        .child("uf")
        .child("SP");
    assert_eq!(sp.to_string(), "dados/2020/Renda/baixa/uf/SP");
    let doc = store.get(&sp).expect("SP document written");
    assert_eq!(doc["uf"], json!("São Paulo"));
    assert_eq!(doc["sigla_uf"], json!("SP"));
    assert_eq!(doc["admissoes"], json!(100));
    assert_eq!(doc["saldo"], json!(20));

    let ac = DocPath::collection("dados")
        .child("2020")
        .child("Renda")
        .child("baixa")
        .child("uf")
        .child("AC");
    assert!(store.get(&ac).is_some(), "state code is trimmed");
    Ok(())
}

#[tokio::test]
async fn test_file_directly_under_year_uses_default_category() -> Result<()> {
    let dir = tempdir()?;
    write(dir.path(), "2021/Total_ALTA.csv", "UF,Sigla UF\nCeará,CE\n");
    let config = test_config(dir.path());
    let store = InMemoryStore::new();
    let loader = Loader::new(Arc::new(store.clone()), &config);

    run_tree(&loader, &config.tree).await?;
    let paths: Vec<String> = store.documents().iter().map(|(p, _)| p.to_string()).collect();
    assert_eq!(paths, vec!["dados/2021/GERAL/alta/uf/CE"]);
    Ok(())
}

#[tokio::test]
async fn test_missing_state_code_column_writes_nothing() -> Result<()> {
    let dir = tempdir()?;
    write(dir.path(), "2020/Renda/Renda_2020_MEDIA.csv", "UF,Admissões\nSão Paulo,3\n");
    let mut config = test_config(dir.path());
    config.policy.on_error = FailurePolicy::FailFast;
    let store = InMemoryStore::new();
    let loader = Loader::new(Arc::new(store.clone()), &config);

    let report = run_tree(&loader, &config.tree).await?;
    assert!(store.is_empty());
    assert_eq!(report.files_skipped, 1);
    assert_eq!(report.rows_written, 0);
    assert!(!report.aborted);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("sigla_uf"));
    assert!(report.errors[0].contains("Renda_2020_MEDIA.csv"));
    Ok(())
}

#[tokio::test]
async fn test_blank_header_columns_keep_their_values() -> Result<()> {
    let dir = tempdir()?;
    write(dir.path(), "2020/Renda/Renda_2020_BAIXA.csv", "UF,Sigla UF,,\nSão Paulo,SP,1,2\n");
    let config = test_config(dir.path());
    let store = InMemoryStore::new();
    let loader = Loader::new(Arc::new(store.clone()), &config);

    let report = run_tree(&loader, &config.tree).await?;
    assert_eq!(report.rows_written, 1);

    let (_, doc) = store.documents().into_iter().next().expect("one document");
    let keys: Vec<&str> = doc.keys().map(|k| k.as_str()).collect();
    assert_eq!(keys, vec!["sigla_uf", "uf", "unnamed:_2", "unnamed:_3"]);
    assert_eq!(doc["unnamed:_2"], json!(1));
    assert_eq!(doc["unnamed:_3"], json!(2));
    assert!(doc.keys().all(|k| !k.is_empty()));
    Ok(())
}

#[tokio::test]
async fn test_xlsx_sheet_is_uploaded() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("2022/Renda/Renda_2022_ALTA.xlsx");
    fs::create_dir_all(path.parent().unwrap())?;
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let worksheet = workbook.add_worksheet();
    for (col, header) in ["UF", "Sigla UF", "Admissões"].iter().enumerate() {
        worksheet.write_string(0, col as u16, *header)?;
    }
    worksheet.write_string(1, 0, "Pernambuco")?;
    worksheet.write_string(1, 1, "PE")?;
    worksheet.write_number(1, 2, 42.0)?;
    workbook.save(&path)?;

    let mut config = test_config(dir.path());
    config.tree.extensions = vec!["xlsx".to_string()];
    let store = InMemoryStore::new();
    let loader = Loader::new(Arc::new(store.clone()), &config);

    let report = run_tree(&loader, &config.tree).await?;
    assert_eq!(report.files_read, 1);

    let pe = DocPath::collection("dados")
        .child("2022")
        .child("Renda")
        .child("alta")
        .child("uf")
        .child("PE");
    let doc = store.get(&pe).expect("PE document written");
    assert_eq!(doc["uf"], json!("Pernambuco"));
    assert_eq!(doc["admissoes"], json!(42));
    Ok(())
}

#[tokio::test]
async fn test_walker_skips_loose_files_and_other_extensions() -> Result<()> {
    let dir = tempdir()?;
    write(dir.path(), "LEIAME.csv", "UF,Sigla UF\nAcre,AC\n");
    write(dir.path(), "2020/notas.txt", "nada");
    write(dir.path(), "2020/Renda/Renda_2020_BAIXA.csv", RENDA_BAIXA);
    write(dir.path(), "2019/Sexo_HOMEM.csv", RENDA_BAIXA);

    let config = test_config(dir.path());
    let found = discover_sheets(&config.tree)?;
    let summary: Vec<(String, String, String)> = found
        .into_iter()
        .map(|f| (f.year, f.category, f.condition))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("2019".to_string(), "GERAL".to_string(), "homem".to_string()),
            ("2020".to_string(), "Renda".to_string(), "baixa".to_string()),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_unreadable_file_is_skipped_best_effort() -> Result<()> {
    let dir = tempdir()?;
    write(dir.path(), "2020/Renda/Renda_2020_ALTA.xlsx", "not really a workbook");
    write(dir.path(), "2020/Renda/Renda_2020_BAIXA.csv", RENDA_BAIXA);
    let mut config = test_config(dir.path());
    config.tree.extensions = vec!["xlsx".to_string(), "csv".to_string()];
    let store = InMemoryStore::new();
    let loader = Loader::new(Arc::new(store.clone()), &config);

    let report = run_tree(&loader, &config.tree).await?;
    assert_eq!(report.files_skipped, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(store.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_row_write_failure_best_effort_continues() -> Result<()> {
    let dir = tempdir()?;
    write(dir.path(), "2020/Renda/Renda_2020_BAIXA.csv", RENDA_BAIXA);
    let config = test_config(dir.path());
    let store = Arc::new(FailingStore {
        inner: InMemoryStore::new(),
        fail_code: "SP",
        attempts: AtomicUsize::new(0),
    });
    let loader = Loader::new(store.clone(), &config);

    let report = run_tree(&loader, &config.tree).await?;
    assert_eq!(report.rows_failed, 1);
    assert_eq!(report.rows_written, 1);
    assert_eq!(store.attempts.load(Ordering::SeqCst), 2);
    assert!(report.errors[0].contains("SP"));
    Ok(())
}

#[tokio::test]
async fn test_row_write_failure_fail_fast_stops() -> Result<()> {
    let dir = tempdir()?;
    write(dir.path(), "2020/Renda/Renda_2020_BAIXA.csv", RENDA_BAIXA);
    write(dir.path(), "2021/Renda/Renda_2021_BAIXA.csv", RENDA_BAIXA);
    let mut config = test_config(dir.path());
    config.policy.on_error = FailurePolicy::FailFast;
    let store = Arc::new(FailingStore {
        inner: InMemoryStore::new(),
        fail_code: "SP",
        attempts: AtomicUsize::new(0),
    });
    let loader = Loader::new(store.clone(), &config);

    let report = run_tree(&loader, &config.tree).await?;
    assert!(report.aborted);
    assert_eq!(store.attempts.load(Ordering::SeqCst), 1);
    assert!(store.inner.is_empty());
    Ok(())
}
