use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::Path;
use uuid::Uuid;

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub pipeline: String,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub files_read: usize,
    pub files_skipped: usize,
    pub rows_read: usize,
    pub rows_written: usize,
    pub rows_failed: usize,
    pub aborted: bool,
    pub errors: Vec<String>,
}

impl LoadReport {
    pub fn start(pipeline: &str) -> Self {
        Self {
            pipeline: pipeline.to_string(),
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            files_read: 0,
            files_skipped: 0,
            rows_read: 0,
            rows_written: 0,
            rows_failed: 0,
            aborted: false,
            errors: Vec::new(),
        }
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn is_clean(&self) -> bool {
        !self.aborted && self.errors.is_empty()
    }

    pub fn print_summary(&self) {
        println!("\n📊 {} results (run {}):", self.pipeline, self.run_id);
        println!("   Files read: {}", self.files_read);
        println!("   Files skipped: {}", self.files_skipped);
        println!("   Rows read: {}", self.rows_read);
        println!("   Rows written: {}", self.rows_written);
        println!("   Rows failed: {}", self.rows_failed);
        if self.aborted {
            println!("   ❌ Run aborted");
        }
        if !self.errors.is_empty() {
            println!("\n⚠️  Errors encountered:");
            for error in &self.errors {
                println!("   - {}", error);
            }
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
