use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Authentication failed: {0}")]
    Auth(#[from] gcp_auth::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported spreadsheet format: {0}")]
    UnsupportedFormat(String),

    #[error("Missing required column '{column}' in {file}")]
    MissingColumn { column: String, file: String },

    #[error("No worksheet found in {0}")]
    NoWorksheet(String),

    #[error("Store responded {status}: {body}")]
    Store { status: u16, body: String },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

pub type Result<T> = std::result::Result<T, LoaderError>;
