use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::application::{BatchResult, RunReport};
use crate::domain::format_cents;

pub const LEDGER_FILE: &str = "ledger.csv";
pub const TRACE_FILE: &str = "trace.csv";
pub const SUMMARY_FILE: &str = "summary.csv";
pub const REPORT_FILE: &str = "report.json";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Options for writing run output
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    /// Prefix CSV files with a UTF-8 byte-order mark so spreadsheets detect the encoding
    pub excel_bom: bool,
    /// Also write the JSON run report
    pub json_report: bool,
}

/// Exporter for writing a finished batch as tabular data
pub struct Exporter<'a> {
    batch: &'a BatchResult,
    options: ExportOptions,
}

impl<'a> Exporter<'a> {
    pub fn new(batch: &'a BatchResult, options: ExportOptions) -> Self {
        Self { batch, options }
    }

    fn csv_writer<W: Write>(&self, mut writer: W) -> Result<csv::Writer<W>> {
        if self.options.excel_bom {
            writer.write_all(UTF8_BOM)?;
        }
        Ok(csv::Writer::from_writer(writer))
    }

    /// Export the day-level ledger to CSV format
    pub fn export_ledger_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let mut csv_writer = self.csv_writer(writer)?;

        csv_writer.write_record(["date", "enrollment_code", "product_id", "amount"])?;

        for entry in &self.batch.ledger {
            csv_writer.write_record([
                format_date(Some(entry.date)),
                entry.enrollment_code.clone(),
                entry.product_id.clone().unwrap_or_default(),
                format_cents(entry.amount_cents),
            ])?;
        }

        csv_writer.flush()?;
        Ok(self.batch.ledger.len())
    }

    /// Export the audit trail to CSV format
    pub fn export_trace_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let mut csv_writer = self.csv_writer(writer)?;

        csv_writer.write_record([
            "enrollment_code",
            "amount",
            "modality",
            "enrollment_date",
            "product_start",
            "product_end",
            "recognition_start",
            "recognition_end",
            "duration_months",
            "resolved_start",
            "resolved_end",
            "status",
            "origin",
        ])?;

        for trace in &self.batch.traces {
            csv_writer.write_record([
                trace.enrollment_code.clone(),
                format_cents(trace.amount_cents),
                trace.modality.clone().unwrap_or_default(),
                format_date(trace.enrollment_date),
                format_date(trace.product_start),
                format_date(trace.product_end),
                format_date(trace.recognition_start),
                format_date(trace.recognition_end),
                trace
                    .duration_months
                    .map(|m| m.to_string())
                    .unwrap_or_default(),
                format_date(trace.resolved_start),
                format_date(trace.resolved_end),
                trace.status.as_str().to_string(),
                trace.origin.clone(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(self.batch.traces.len())
    }

    /// Export per course/enrollment totals to CSV format
    pub fn export_summary_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let mut csv_writer = self.csv_writer(writer)?;

        csv_writer.write_record(["product_id", "enrollment_code", "amount"])?;

        for summary in &self.batch.summaries {
            csv_writer.write_record([
                summary.product_id.clone().unwrap_or_default(),
                summary.enrollment_code.clone(),
                format_cents(summary.amount_cents),
            ])?;
        }

        csv_writer.flush()?;
        Ok(self.batch.summaries.len())
    }

    /// Export the run report as JSON
    pub fn export_report_json<W: Write>(&self, report: &RunReport, mut writer: W) -> Result<()> {
        let json = serde_json::to_string_pretty(report)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    /// Write ledger, trace and summary (and optionally the report) into `dir`.
    /// Returns the paths written; they are also recorded on the report.
    pub fn write_all(&self, dir: &Path, report: &mut RunReport) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

        if self.batch.ledger.is_empty() {
            warn!("No allocation data generated");
        }

        let mut written = Vec::new();

        let path = dir.join(LEDGER_FILE);
        let rows = self.export_ledger_csv(create(&path)?)?;
        info!(path = %path.display(), rows, "Wrote ledger");
        written.push(path);

        let path = dir.join(TRACE_FILE);
        let rows = self.export_trace_csv(create(&path)?)?;
        info!(path = %path.display(), rows, "Wrote trace");
        written.push(path);

        let path = dir.join(SUMMARY_FILE);
        let rows = self.export_summary_csv(create(&path)?)?;
        info!(path = %path.display(), rows, "Wrote summary");
        written.push(path);

        if self.options.json_report {
            let path = dir.join(REPORT_FILE);
            report.files = written
                .iter()
                .chain(std::iter::once(&path))
                .map(|p| p.display().to_string())
                .collect();
            self.export_report_json(report, create(&path)?)?;
            info!(path = %path.display(), "Wrote run report");
            written.push(path);
        } else {
            report.files = written.iter().map(|p| p.display().to_string()).collect();
        }

        Ok(written)
    }
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{BatchOptions, process_batch};
    use crate::domain::{EnrollmentRecord, JoinedRecord, Modality, ProductRecord};

    fn batch() -> BatchResult {
        let day = NaiveDate::from_ymd_opt(2024, 2, 10).unwrap();
        let records = vec![JoinedRecord::new(
            EnrollmentRecord::new("E2", 10000)
                .with_date(day)
                .with_product("C2"),
            Some(ProductRecord::new("C2", Modality::Online)),
        )];
        process_batch(&records, &BatchOptions::default())
    }

    #[test]
    fn test_ledger_csv() {
        let batch = batch();
        let mut out = Vec::new();
        let rows = Exporter::new(&batch, ExportOptions::default())
            .export_ledger_csv(&mut out)
            .unwrap();

        assert_eq!(rows, 1);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "date,enrollment_code,product_id,amount\n2024-02-10,E2,C2,100.00\n"
        );
    }

    #[test]
    fn test_trace_csv_with_bom() {
        let batch = batch();
        let mut out = Vec::new();
        let options = ExportOptions {
            excel_bom: true,
            ..ExportOptions::default()
        };
        Exporter::new(&batch, options)
            .export_trace_csv(&mut out)
            .unwrap();

        assert!(out.starts_with(UTF8_BOM));
        let text = String::from_utf8(out[UTF8_BOM.len()..].to_vec()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[1],
            "E2,100.00,ONLINE,2024-02-10,,,,,,2024-02-10,2024-02-10,resolved,ONLINE"
        );
    }

    #[test]
    fn test_summary_csv() {
        let batch = batch();
        let mut out = Vec::new();
        Exporter::new(&batch, ExportOptions::default())
            .export_summary_csv(&mut out)
            .unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "product_id,enrollment_code,amount\nC2,E2,100.00\n"
        );
    }
}
