//! Column and collection names shared by both pipelines.
//! Field names are the document keys the dashboard filters on.

pub const DEFAULT_COLLECTION: &str = "dados";
pub const DEFAULT_CATEGORY: &str = "GERAL";
pub const STATE_SUBCOLLECTION: &str = "uf";

// Shared fields of a flat dimension row
pub const FIELD_YEAR: &str = "ano";
pub const FIELD_STATE: &str = "uf";
pub const FIELD_ADMISSIONS: &str = "admissoes";
pub const FIELD_TERMINATIONS: &str = "desligamentos";
pub const FIELD_BALANCE: &str = "saldo";

// Source spreadsheet headers feeding the shared fields
pub const SOURCE_YEAR: &str = "Ano";
pub const SOURCE_STATE: &str = "UF";
pub const SOURCE_ADMISSIONS: &str = "Admissões";
pub const SOURCE_TERMINATIONS: &str = "Desligamentos";
pub const SOURCE_BALANCE: &str = "Saldo";

// Demographic fields, exactly one populated per dimension table
pub const FIELD_SEX: &str = "sexo";
pub const FIELD_WELFARE: &str = "bolsaFamilia";
pub const FIELD_POVERTY: &str = "situacaoPobreza";
pub const FIELD_SECTOR: &str = "setorEconomico";
pub const FIELD_RACE: &str = "racaCor";
pub const FIELD_EDUCATION: &str = "grauInstrucao";
pub const FIELD_AGE: &str = "faixaEtaria";
pub const FIELD_REGISTRY: &str = "cadUnico";
pub const FIELD_CATEGORY: &str = "categoria";

pub const DEMOGRAPHIC_FIELDS: [&str; 9] = [
    FIELD_SEX,
    FIELD_WELFARE,
    FIELD_POVERTY,
    FIELD_SECTOR,
    FIELD_RACE,
    FIELD_EDUCATION,
    FIELD_AGE,
    FIELD_REGISTRY,
    FIELD_CATEGORY,
];

/// Column order of the flat table.
pub fn flat_columns() -> Vec<&'static str> {
    let mut cols = vec![
        FIELD_YEAR,
        FIELD_STATE,
        FIELD_ADMISSIONS,
        FIELD_TERMINATIONS,
        FIELD_BALANCE,
    ];
    cols.extend(DEMOGRAPHIC_FIELDS);
    cols
}

// Required slugified columns of a hierarchical sheet
pub const TREE_STATE_COLUMN: &str = "uf";
pub const TREE_STATE_CODE_COLUMN: &str = "sigla_uf";

pub const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";
pub const FIRESTORE_HOST: &str = "https://firestore.googleapis.com";

pub fn is_demographic_field(field: &str) -> bool {
    DEMOGRAPHIC_FIELDS.contains(&field)
}
