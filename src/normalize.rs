use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

/// Decomposes to NFKD and drops everything outside ASCII, so "São" becomes "Sao".
pub fn strip_diacritics(input: &str) -> String {
    input.nfkd().filter(|c| c.is_ascii()).collect()
}

/// Normalizes a free-text cell: no accents, upper-case, trimmed.
pub fn normalize_str(input: &str) -> String {
    strip_diacritics(input).to_uppercase().trim().to_string()
}

/// Cell-level normalizer. Strings are normalized, every other value is returned as-is.
pub fn normalize_text(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(normalize_str(s)),
        other => other.clone(),
    }
}

/// Turns a spreadsheet header into a document key: `"Situação de Pobreza"` -> `"situacao_de_pobreza"`.
pub fn slugify_column(header: &str) -> String {
    strip_diacritics(header)
        .trim()
        .replace(' ', "_")
        .to_lowercase()
}
