use crate::error::{ExportError, Result};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_PAGE_SIZE: u32 = 100;
const MAX_PAGE_SIZE: u32 = 100;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONCURRENCY: usize = 4;

/// Run-wide settings, passed explicitly to every stage of an export
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExportConfig {
    /// Roster CSV listing the companies to export
    #[serde(alias = "companiesDataInputFile")]
    pub input_file: PathBuf,
    /// Root folder holding one sub-folder per company
    #[serde(alias = "companiesDataOutputFolder")]
    pub output_folder: PathBuf,
    /// strftime template used for row dates and file names
    #[serde(alias = "dateFormatTemplate")]
    pub date_format: String,
    pub file_name_prefix: String,
    pub api_base: String,
    pub page_size: u32,
    pub request_timeout_secs: u64,
    /// Maximum number of companies exported at the same time
    pub concurrency: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            input_file: PathBuf::from("companies.csv"),
            output_folder: PathBuf::from("out"),
            date_format: "%Y-%m-%d".to_string(),
            file_name_prefix: "stripe_".to_string(),
            api_base: "https://api.stripe.com".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl ExportConfig {
    /// Load settings from a JSON file. Keys that are absent keep their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            ExportError::Config(format!("reading {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| ExportError::Config(format!("parsing {}: {}", path.display(), e)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.date_format.is_empty()
            || StrftimeItems::new(&self.date_format).any(|item| matches!(item, Item::Error))
        {
            return Err(ExportError::Config(format!(
                "invalid date format template '{}'",
                self.date_format
            )));
        }
        // The same template names the export file
        let sample = DateTime::<Utc>::from_timestamp(0, 0)
            .map(|epoch| epoch.format(&self.date_format).to_string())
            .unwrap_or_default();
        if sample.contains(['/', '\\']) || self.file_name_prefix.contains(['/', '\\']) {
            return Err(ExportError::Config(format!(
                "file name '{}' would contain a path separator",
                self.file_name(&sample)
            )));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(ExportError::Config(format!(
                "page size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, self.page_size
            )));
        }
        if self.concurrency == 0 {
            return Err(ExportError::Config("concurrency must be at least 1".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ExportError::Config("request timeout must be at least 1 second".to_string()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Name of the export file for a run on the given date
    pub fn file_name(&self, formatted_date: &str) -> String {
        format!("{}{}.csv", self.file_name_prefix, formatted_date)
    }
}
