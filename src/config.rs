use crate::constants;
use crate::error::{LoaderError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "painel_loader.toml";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub firestore: FirestoreConfig,
    pub limits: LimitsConfig,
    pub policy: PolicyConfig,
    pub flat: FlatConfig,
    pub tree: TreeConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FirestoreConfig {
    /// Falls back to FIRESTORE_PROJECT_ID / GOOGLE_CLOUD_PROJECT, then the credential's project.
    pub project_id: Option<String>,
    pub database_id: String,
    pub collection: String,
    pub timeout_seconds: u64,
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            database_id: "(default)".to_string(),
            collection: constants::DEFAULT_COLLECTION.to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// 0 disables the write limiter.
    pub writes_per_minute: u64,
    pub concurrency: Option<u32>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            writes_per_minute: 200,
            concurrency: Some(1),
        }
    }
}

/// What a pipeline does when a file or a write fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the run on the first error.
    FailFast,
    /// Log, record in the report and move on.
    #[default]
    BestEffort,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PolicyConfig {
    pub on_error: FailurePolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlatConfig {
    pub base_path: PathBuf,
    /// Content-addressed document ids instead of store-generated ones.
    pub idempotent: bool,
    pub dimensions: Vec<DimensionSpec>,
}

impl Default for FlatConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("data/consolidados"),
            idempotent: false,
            dimensions: DimensionSpec::defaults(),
        }
    }
}

/// One dimension table: which field it fills and where the value comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionSpec {
    pub field: String,
    pub file: String,
    #[serde(default)]
    pub source_column: Option<String>,
    #[serde(default)]
    pub constant: Option<String>,
}

impl DimensionSpec {
    pub fn from_column(field: &str, file: &str, column: &str) -> Self {
        Self {
            field: field.to_string(),
            file: file.to_string(),
            source_column: Some(column.to_string()),
            constant: None,
        }
    }

    pub fn from_constant(field: &str, file: &str, constant: &str) -> Self {
        Self {
            field: field.to_string(),
            file: file.to_string(),
            source_column: None,
            constant: Some(constant.to_string()),
        }
    }

    pub fn defaults() -> Vec<Self> {
        use constants::*;
        vec![
            Self::from_column(FIELD_SEX, "Sexo_CONSOLIDADO_TODOS_ANOS.xlsx", "Sexo"),
            Self::from_column(FIELD_WELFARE, "BolsaFamilia_CONSOLIDADO_TODOS_ANOS.xlsx", "Bolsa Familia"),
            Self::from_column(FIELD_POVERTY, "SituacaoPobreza_CONSOLIDADO_TODOS_ANOS.xlsx", "Situação de Pobreza"),
            Self::from_column(FIELD_SECTOR, "SetorEconomico_CONSOLIDADO_TODOS_ANOS.xlsx", "Setor Econômico"),
            Self::from_column(FIELD_RACE, "RacaCor_CONSOLIDADO_TODOS_ANOS.xlsx", "Raça/Cor"),
            Self::from_column(FIELD_EDUCATION, "GrauInstrucao_CONSOLIDADO_TODOS_ANOS.xlsx", "Grau de Instrução"),
            Self::from_column(FIELD_AGE, "FaixaEtaria_CONSOLIDADO_TODOS_ANOS.xlsx", "Faixa Etária"),
            Self::from_constant(FIELD_REGISTRY, "CadUnico_CONSOLIDADO_TODOS_ANOS.xlsx", "SIM"),
            Self::from_column(FIELD_CATEGORY, "GERAL_CONSOLIDADO_TODOS_ANOS.xlsx", "Categoria"),
        ]
    }

    pub fn validate(&self) -> Result<()> {
        if !constants::is_demographic_field(&self.field) {
            return Err(LoaderError::Config(format!(
                "Unknown dimension field '{}' (file {})",
                self.field, self.file
            )));
        }
        let has_column = self.source_column.as_deref().is_some_and(|c| !c.is_empty());
        match (has_column, self.constant.is_some()) {
            (true, false) | (false, true) => Ok(()),
            _ => Err(LoaderError::Config(format!(
                "Dimension '{}' needs exactly one of source_column or constant",
                self.field
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    pub base_path: PathBuf,
    pub default_category: String,
    pub extensions: Vec<String>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("data/planilhas"),
            default_category: constants::DEFAULT_CATEGORY.to_string(),
            extensions: vec!["xlsx".to_string()],
        }
    }
}

impl Config {
    /// Reads the TOML file at `path`, then applies environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            LoaderError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        let mut config = Self::from_toml(&content)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env(&mut self) {
        if let Some(p) = non_empty_env("PAINEL_FLAT_BASE_PATH") {
            self.flat.base_path = PathBuf::from(p);
        }
        if let Some(p) = non_empty_env("PAINEL_TREE_BASE_PATH") {
            self.tree.base_path = PathBuf::from(p);
        }
        if self.firestore.project_id.is_none() {
            self.firestore.project_id =
                non_empty_env("FIRESTORE_PROJECT_ID").or_else(|| non_empty_env("GOOGLE_CLOUD_PROJECT"));
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.firestore.collection.trim().is_empty() {
            return Err(LoaderError::Config("firestore.collection must not be empty".into()));
        }
        if self.flat.dimensions.is_empty() {
            return Err(LoaderError::Config("flat.dimensions must not be empty".into()));
        }
        for dim in &self.flat.dimensions {
            dim.validate()?;
        }
        if self.tree.extensions.is_empty() {
            return Err(LoaderError::Config("tree.extensions must not be empty".into()));
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
