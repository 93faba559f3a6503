use crate::error::Result;
use crate::model::ScrapeResult;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const EXPORT_FILE_PREFIX: &str = "universal_profile_scraping_results_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReceipt {
    pub path: PathBuf,
    pub count: usize,
}

/// Destination for accumulated results.
pub trait Exporter: Send {
    fn export(&self, results: &[ScrapeResult], timestamp_ms: i64) -> Result<ExportReceipt>;
}

pub fn export_file_name(timestamp_ms: i64) -> String {
    format!("{}{}.json", EXPORT_FILE_PREFIX, timestamp_ms)
}

/// Results as a pretty-printed JSON array.
pub fn render_results(results: &[ScrapeResult]) -> Result<String> {
    Ok(serde_json::to_string_pretty(results)?)
}

/// Writes each export as a new timestamped file in `dir`.
#[derive(Debug, Clone)]
pub struct JsonFileExporter {
    dir: PathBuf,
}

impl JsonFileExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Exporter for JsonFileExporter {
    fn export(&self, results: &[ScrapeResult], timestamp_ms: i64) -> Result<ExportReceipt> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(export_file_name(timestamp_ms));
        let content = render_results(results)?;

        let mut file = File::create(&path)?;
        file.write_all(content.as_bytes())?;
        tracing::info!(path = %path.display(), count = results.len(), "exported results");

        Ok(ExportReceipt {
            path,
            count: results.len(),
        })
    }
}
