use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use jobharvest_core::models::JobRecord;
use serde::Serialize;

/// Separator for tags inside a single CSV cell.
const TAG_SEPARATOR: &str = ";";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    /// Format implied by the file extension, if any.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "csv" => Some(ExportFormat::Csv),
            _ => None,
        }
    }

    /// An explicit `--format` wins, then the extension, then JSON.
    pub fn resolve(explicit: Option<Self>, path: &Path) -> Self {
        explicit
            .or_else(|| Self::from_path(path))
            .unwrap_or(ExportFormat::Json)
    }
}

/// One CSV line; same field set and order as the JSON export.
#[derive(Serialize)]
struct CsvRow<'a> {
    source: &'a str,
    mode: &'a str,
    title: &'a str,
    company: &'a str,
    location: Option<&'a str>,
    salary: Option<&'a str>,
    salary_min: Option<i64>,
    salary_max: Option<i64>,
    currency: Option<&'a str>,
    tags: String,
    posted_date: Option<String>,
    job_url: &'a str,
    is_remote: bool,
    created_at: String,
    updated_at: String,
}

impl<'a> From<&'a JobRecord> for CsvRow<'a> {
    fn from(record: &'a JobRecord) -> Self {
        CsvRow {
            source: &record.source,
            mode: record.mode.as_str(),
            title: &record.title,
            company: &record.company,
            location: record.location.as_deref(),
            salary: record.salary.as_deref(),
            salary_min: record.salary_min,
            salary_max: record.salary_max,
            currency: record.currency.as_deref(),
            tags: record
                .tags
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(TAG_SEPARATOR),
            posted_date: record.posted_date.map(|d| d.to_rfc3339()),
            job_url: &record.job_url,
            is_remote: record.is_remote,
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
        }
    }
}

pub fn write_json<W: Write>(records: &[JobRecord], writer: W) -> Result<()> {
    serde_json::to_writer_pretty(writer, records).context("Failed to write JSON")
}

pub fn write_csv<W: Write>(records: &[JobRecord], writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for record in records {
        csv.serialize(CsvRow::from(record))
            .context("Failed to write CSV row")?;
    }
    csv.flush().context("Failed to flush CSV")?;
    Ok(())
}

/// Write `records` to `path`, replacing any existing file.
pub fn export_to_file(records: &[JobRecord], path: &Path, format: ExportFormat) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    match format {
        ExportFormat::Json => write_json(records, &mut writer)?,
        ExportFormat::Csv => write_csv(records, &mut writer)?,
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), count = records.len(), ?format, "Exported records");
    Ok(())
}
