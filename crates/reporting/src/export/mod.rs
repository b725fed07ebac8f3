//! Report exporter: encodes a processed report as JSON, CSV, a spreadsheet
//! workbook, or a paginated PDF, and writes it atomically into the reports
//! directory as `report-{id}-{epochMillis}.{ext}`.

mod csv;
mod document;
mod spreadsheet;

use crate::report_builder::Report;
use campaign_core::config::ReportingConfig;
use campaign_core::{CampaignError, CampaignResult, DateRange};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
    Spreadsheet,
    Document,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Spreadsheet => "spreadsheet",
            ExportFormat::Document => "document",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Spreadsheet => "xls",
            ExportFormat::Document => "pdf",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv",
            ExportFormat::Spreadsheet => "application/vnd.ms-excel",
            ExportFormat::Document => "application/pdf",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = CampaignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "spreadsheet" | "excel" | "xls" => Ok(ExportFormat::Spreadsheet),
            "document" | "pdf" => Ok(ExportFormat::Document),
            other => Err(CampaignError::validation(format!(
                "unsupported export format '{other}'"
            ))),
        }
    }
}

/// JSON export layout: metadata first, then the untouched payload.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonExport {
    pub name: String,
    #[serde(rename = "type")]
    pub report_type: String,
    pub date_range: DateRange,
    pub data: Value,
}

#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub format: ExportFormat,
    pub file_name: String,
    pub path: PathBuf,
    /// Relative location handed to the HTTP layer.
    pub file_url: String,
    pub bytes: Vec<u8>,
}

/// The three metadata fields every format writes before its body, in order.
pub(crate) fn metadata(report: &Report) -> [(&'static str, String); 3] {
    [
        ("Report", report.name.clone()),
        ("Type", report.report_type.to_string()),
        ("Date Range", report.date_range.to_string()),
    ]
}

/// Tabular body of a payload: its `rows` array, a bare array, or the
/// top-level fields as a single record.
pub(crate) struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

pub(crate) fn table(payload: &Value) -> Table {
    let records: Vec<&serde_json::Map<String, Value>> = match payload {
        Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
        Value::Object(map) => match map.get("rows") {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_object).collect(),
            _ => vec![map],
        },
        _ => Vec::new(),
    };

    let headers: Vec<String> = records
        .first()
        .map(|first| first.keys().cloned().collect())
        .unwrap_or_default();
    let rows = records
        .iter()
        .map(|record| {
            headers
                .iter()
                .map(|h| record.get(h).cloned().unwrap_or(Value::Null))
                .collect()
        })
        .collect();
    Table { headers, rows }
}

pub(crate) fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Collisions tolerated within one export before giving up.
const MAX_NAME_ATTEMPTS: usize = 16;

pub fn file_name(report_id: Uuid, format: ExportFormat, at: DateTime<Utc>) -> String {
    format!(
        "report-{}-{}.{}",
        report_id,
        at.timestamp_millis(),
        format.extension()
    )
}

pub struct ReportExporter {
    reports_dir: PathBuf,
    file_url_prefix: String,
    lines_per_page: usize,
}

impl ReportExporter {
    pub fn new(config: &ReportingConfig) -> Self {
        Self {
            reports_dir: PathBuf::from(&config.reports_dir),
            file_url_prefix: config.file_url_prefix.trim_end_matches('/').to_string(),
            lines_per_page: config.document_lines_per_page,
        }
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    /// Encode without touching the filesystem.
    pub fn render(&self, report: &Report, format: ExportFormat) -> CampaignResult<Vec<u8>> {
        match format {
            ExportFormat::Json => {
                let export = JsonExport {
                    name: report.name.clone(),
                    report_type: report.report_type.to_string(),
                    date_range: report.date_range,
                    data: report.data.clone(),
                };
                Ok(serde_json::to_vec_pretty(&export)?)
            }
            ExportFormat::Csv => Ok(csv::render(report).into_bytes()),
            ExportFormat::Spreadsheet => Ok(spreadsheet::render(report).into_bytes()),
            ExportFormat::Document => Ok(document::render(report, self.lines_per_page)),
        }
    }

    /// Render and persist. The bytes go to a temporary file in the reports
    /// directory that is renamed into place only once fully written. Existing
    /// artifacts are never overwritten.
    pub fn export(&self, report: &Report, format: ExportFormat) -> CampaignResult<ExportArtifact> {
        let bytes = self.render(report, format)?;

        let (file_name, path) = match self.write_atomically(report.id, format, &bytes) {
            Ok(written) => written,
            Err(e) => {
                metrics::counter!("reports.export_failures", "format" => format.as_str())
                    .increment(1);
                warn!(report_id = %report.id, error = %e, "Report export failed");
                return Err(e);
            }
        };

        metrics::counter!("reports.exported", "format" => format.as_str()).increment(1);
        info!(report_id = %report.id, file = %file_name, size = bytes.len(), "Report exported");
        Ok(ExportArtifact {
            format,
            file_url: format!("{}/{}", self.file_url_prefix, file_name),
            file_name,
            path,
            bytes,
        })
    }

    fn write_atomically(
        &self,
        report_id: Uuid,
        format: ExportFormat,
        bytes: &[u8],
    ) -> CampaignResult<(String, PathBuf)> {
        let io_err = |path: &Path, source: std::io::Error| CampaignError::ExportIo {
            path: path.to_path_buf(),
            source,
        };
        let dir = self.reports_dir.as_path();
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".report-")
            .suffix(".part")
            .tempfile_in(dir)
            .map_err(|e| io_err(dir, e))?;
        tmp.write_all(bytes).map_err(|e| io_err(dir, e))?;
        tmp.as_file().sync_all().map_err(|e| io_err(dir, e))?;

        // A name taken by an export in the same millisecond moves to the next one.
        let mut at = Utc::now();
        for _ in 0..MAX_NAME_ATTEMPTS {
            let file_name = file_name(report_id, format, at);
            let path = self.reports_dir.join(&file_name);
            match tmp.persist_noclobber(&path) {
                Ok(_) => return Ok((file_name, path)),
                Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                    tmp = e.file;
                    at += chrono::Duration::milliseconds(1);
                }
                Err(e) => return Err(io_err(&path, e.error)),
            }
        }
        Err(io_err(
            dir,
            std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("no free artifact name for report {report_id}"),
            ),
        ))
    }

    /// Delete an artifact previously produced by [`export`](Self::export).
    /// Missing files are not an error.
    pub fn remove(&self, file_url: &str) -> CampaignResult<()> {
        let name = file_url.rsplit('/').next().unwrap_or(file_url);
        if !name.starts_with("report-") || name.contains('\\') || name.contains("..") {
            return Err(CampaignError::validation(format!(
                "'{file_url}' is not a report artifact"
            )));
        }
        match std::fs::remove_file(self.reports_dir.join(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::export::ExportFormat;
    use crate::processors::ReportType;
    use crate::report_builder::{Report, ReportFilters, ReportStatus};
    use campaign_core::{DateRange, Granularity};
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    pub fn report() -> Report {
        Report {
            id: Uuid::from_u128(42),
            user_id: Uuid::from_u128(7),
            name: "Q1 \"Search\" Performance".into(),
            report_type: ReportType::CampaignPerformance,
            date_range: DateRange::new(
                "2024-01-01".parse().unwrap(),
                "2024-03-31".parse().unwrap(),
            )
            .unwrap(),
            campaign_ids: vec![],
            metrics: vec![],
            filters: ReportFilters::default(),
            group_by: Granularity::Monthly,
            format: ExportFormat::Csv,
            status: ReportStatus::Completed,
            data: json!({
                "rows": [
                    {"campaignName": "Brand, Search", "impressions": 1000, "ctr": 5.0},
                    {"campaignName": "Display <Retarget>", "impressions": 2000, "ctr": 1.0},
                ],
                "totals": {"impressions": 3000},
            }),
            file_url: None,
            export_error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}
