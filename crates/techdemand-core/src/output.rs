//! Report serializers: JSON record, fixed-width text table and CSV matrix.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::OutputConfig;
use crate::error::AppError;
use crate::report::Report;

const TABLE_PADDING: usize = 2;
const SEPARATOR: &str = "----------";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Txt,
    Csv,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Txt => "txt",
            OutputFormat::Csv => "csv",
        }
    }

    /// `<date>.json` for the record, `<prefix>_<date>.<ext>` for the tables.
    pub fn file_name(&self, prefix: &str, date: &str) -> String {
        match self {
            OutputFormat::Json => format!("{date}.json"),
            OutputFormat::Txt | OutputFormat::Csv => format!("{prefix}_{date}.{}", self.as_str()),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "txt" | "text" => Ok(OutputFormat::Txt),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// Write the report in every configured format. Returns the written paths.
pub fn write_report(report: &Report, config: &OutputConfig) -> Result<Vec<PathBuf>, AppError> {
    ensure_dir(&config.directory)?;
    let date = report.date_stamp();

    let mut written = Vec::with_capacity(config.formats.len());
    for format in &config.formats {
        let path = config
            .directory
            .join(format.file_name(&config.filename_prefix, &date));
        let file = File::create(&path).map_err(|e| {
            AppError::OutputError(format!("Cannot create {}: {e}", path.display()))
        })?;
        let mut writer = BufWriter::new(file);

        match format {
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut writer, report)?;
                writer.write_all(b"\n")?;
            }
            OutputFormat::Txt => writer.write_all(render_table(report).as_bytes())?,
            OutputFormat::Csv => writer.write_all(render_csv(report)?.as_bytes())?,
        }
        writer.flush()?;

        tracing::info!(path = %path.display(), %format, "Report written");
        written.push(path);
    }
    Ok(written)
}

fn ensure_dir(dir: &Path) -> Result<(), AppError> {
    match std::fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(AppError::OutputError(format!(
            "Path '{}' exists but is not a directory",
            dir.display()
        ))),
        Err(_) => std::fs::create_dir_all(dir).map_err(|e| {
            AppError::OutputError(format!(
                "Failed to create output directory {}: {e}",
                dir.display()
            ))
        }),
    }
}

/// Fixed-width table: technologies as rows, cities plus a total as columns.
pub fn render_table(report: &Report) -> String {
    let mut rows: Vec<Vec<String>> = Vec::with_capacity(report.technologies.len() + 2);

    let mut header = vec!["Technology".to_string()];
    header.extend(report.cities.iter().map(|c| c.name.clone()));
    header.push("TOTAL".to_string());
    rows.push(header);

    rows.push(vec![SEPARATOR.to_string(); report.cities.len() + 2]);

    for tech in &report.technologies {
        let mut row = vec![tech.name.clone()];
        row.extend(
            report
                .cities
                .iter()
                .map(|c| c.vacancies.get(&tech.name).copied().unwrap_or(0).to_string()),
        );
        row.push(report.summary.get(&tech.name).unwrap_or(0).to_string());
        rows.push(row);
    }

    let columns = report.cities.len() + 2;
    let widths: Vec<usize> = (0..columns)
        .map(|i| {
            rows.iter()
                .filter_map(|r| r.get(i))
                .map(|cell| cell.chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    out.push_str("VACANCY STATISTICS\n");
    out.push_str(&format!(
        "Date: {}\n\n",
        report.generated_at.format("%d.%m.%Y")
    ));
    for row in &rows {
        let last = row.len() - 1;
        for (i, cell) in row.iter().enumerate() {
            out.push_str(cell);
            if i < last {
                let pad = widths[i] - cell.chars().count() + TABLE_PADDING;
                out.extend(std::iter::repeat_n(' ', pad));
            }
        }
        out.push('\n');
    }
    out
}

/// CSV matrix with the same layout as the table plus a row of city totals.
pub fn render_csv(report: &Report) -> Result<String, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let csv_err = |e: csv::Error| AppError::OutputError(format!("CSV error: {e}"));

    let mut header = vec!["technology".to_string()];
    header.extend(report.cities.iter().map(|c| c.name.clone()));
    header.push("total".to_string());
    writer.write_record(&header).map_err(csv_err)?;

    for tech in &report.technologies {
        let mut record = vec![tech.name.clone()];
        record.extend(
            report
                .cities
                .iter()
                .map(|c| c.vacancies.get(&tech.name).copied().unwrap_or(0).to_string()),
        );
        record.push(report.summary.get(&tech.name).unwrap_or(0).to_string());
        writer.write_record(&record).map_err(csv_err)?;
    }

    let mut totals = vec!["total".to_string()];
    totals.extend(report.cities.iter().map(|c| c.total.to_string()));
    totals.push(report.summary.total.to_string());
    writer.write_record(&totals).map_err(csv_err)?;

    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::OutputError(format!("CSV error: {e}")))?;
    String::from_utf8(bytes).map_err(|e| AppError::OutputError(format!("CSV error: {e}")))
}
