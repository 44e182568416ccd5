use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::io::Read;
use tracing::warn;

use crate::application::RecognitionService;
use crate::domain::{EnrollmentRecord, Modality, ProductRecord, parse_cents};

/// Result of an import operation
#[derive(Debug, Clone)]
pub struct ImportResult {
    pub imported: usize,
    pub skipped: usize,
    pub errors: Vec<ImportError>,
}

/// Error that occurred during import
#[derive(Debug, Clone)]
pub struct ImportError {
    pub line: usize,
    pub field: Option<String>,
    pub error: String,
}

/// Options for import operations
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub dry_run: bool,
    pub validate_only: bool,
}

/// Rows parsed from a CSV file, plus the rows that could not be parsed.
#[derive(Debug, Clone)]
pub struct ParsedRows<T> {
    pub records: Vec<T>,
    pub errors: Vec<ImportError>,
}

/// Column positions resolved from a header row.
struct Columns {
    headers: Vec<String>,
}

impl Columns {
    fn from_reader<R: Read>(reader: &mut csv::Reader<R>, required: &[&str]) -> Result<Self> {
        let headers: Vec<String> = reader
            .headers()
            .context("Failed to read CSV header")?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_lowercase())
            .collect();

        for name in required {
            if !headers.iter().any(|h| h == name) {
                bail!("Missing required column '{}'", name);
            }
        }
        Ok(Self { headers })
    }

    /// Trimmed cell value, `None` when the column is absent or the cell empty.
    fn get<'r>(&self, record: &'r csv::StringRecord, name: &str) -> Option<&'r str> {
        let idx = self.headers.iter().position(|h| h == name)?;
        record.get(idx).map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Parse enrollments from CSV with header
/// `enrollment_code,enrollment_date,amount,product_id`.
///
/// Negative amounts and repeated enrollment codes are row errors; the first
/// row for a code is kept.
pub fn read_enrollments_csv<R: Read>(reader: R) -> Result<ParsedRows<EnrollmentRecord>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let columns = Columns::from_reader(&mut csv_reader, &["enrollment_code", "amount"])?;
    let mut records = Vec::new();
    let mut errors = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for (line_num, result) in csv_reader.records().enumerate() {
        let line = line_num + 2; // +2 for header and 0-indexing

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                errors.push(ImportError {
                    line,
                    field: None,
                    error: format!("CSV parse error: {}", e),
                });
                continue;
            }
        };

        match parse_enrollment(&columns, &record) {
            Ok(enrollment) => {
                if let Some(first) = seen.get(&enrollment.enrollment_code) {
                    errors.push(ImportError {
                        line,
                        field: Some("enrollment_code".to_string()),
                        error: format!(
                            "Duplicate enrollment code {} (first seen on line {})",
                            enrollment.enrollment_code, first
                        ),
                    });
                    continue;
                }
                seen.insert(enrollment.enrollment_code.clone(), line);
                records.push(enrollment);
            }
            Err((field, error)) => errors.push(ImportError {
                line,
                field: Some(field.to_string()),
                error,
            }),
        }
    }

    Ok(ParsedRows { records, errors })
}

fn parse_enrollment(
    columns: &Columns,
    record: &csv::StringRecord,
) -> Result<EnrollmentRecord, (&'static str, String)> {
    let code = columns
        .get(record, "enrollment_code")
        .ok_or(("enrollment_code", "Missing enrollment code".to_string()))?;

    let amount_str = columns
        .get(record, "amount")
        .ok_or(("amount", "Missing amount".to_string()))?;
    let amount_cents =
        parse_cents(amount_str).map_err(|e| ("amount", format!("Invalid amount: {}", e)))?;
    if amount_cents < 0 {
        return Err(("amount", format!("Amount must not be negative: {}", amount_str)));
    }

    let enrollment_date = columns
        .get(record, "enrollment_date")
        .map(parse_date)
        .transpose()
        .map_err(|e| ("enrollment_date", e.to_string()))?;

    Ok(EnrollmentRecord {
        enrollment_code: code.to_string(),
        enrollment_date,
        amount_cents,
        product_id: columns.get(record, "product_id").map(str::to_string),
    })
}

/// Parse products from CSV with header
/// `product_id,modality,start_date,end_date,recognition_start,recognition_end,duration_months`.
///
/// Unparseable dates become absent (with a warning) rather than failing the row.
pub fn read_products_csv<R: Read>(reader: R) -> Result<ParsedRows<ProductRecord>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let columns = Columns::from_reader(&mut csv_reader, &["product_id"])?;
    let mut records = Vec::new();
    let mut errors = Vec::new();

    for (line_num, result) in csv_reader.records().enumerate() {
        let line = line_num + 2;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                errors.push(ImportError {
                    line,
                    field: None,
                    error: format!("CSV parse error: {}", e),
                });
                continue;
            }
        };

        let Some(product_id) = columns.get(&record, "product_id") else {
            errors.push(ImportError {
                line,
                field: Some("product_id".to_string()),
                error: "Missing product id".to_string(),
            });
            continue;
        };

        let duration_months = match columns.get(&record, "duration_months").map(str::parse::<f64>) {
            None => None,
            Some(Ok(months)) => Some(months),
            Some(Err(e)) => {
                errors.push(ImportError {
                    line,
                    field: Some("duration_months".to_string()),
                    error: format!("Invalid duration: {}", e),
                });
                continue;
            }
        };

        let date_or_none = |field: &str| -> Option<NaiveDate> {
            let raw = columns.get(&record, field)?;
            match parse_date(raw) {
                Ok(date) => Some(date),
                Err(_) => {
                    warn!(line, product_id, field, value = raw, "Unparseable date, treated as absent");
                    None
                }
            }
        };

        records.push(ProductRecord {
            product_id: product_id.to_string(),
            modality: Modality::from_str(columns.get(&record, "modality").unwrap_or_default()),
            start_date: date_or_none("start_date"),
            end_date: date_or_none("end_date"),
            recognition_start: date_or_none("recognition_start"),
            recognition_end: date_or_none("recognition_end"),
            duration_months,
        });
    }

    Ok(ParsedRows { records, errors })
}

/// Parse a date, accepting `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` and RFC 3339.
/// Any time part is dropped.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.date());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.date_naive());
    }

    bail!("Invalid date format: {}", s)
}

/// Importer for loading input data into the database
pub struct Importer<'a> {
    service: &'a RecognitionService,
}

impl<'a> Importer<'a> {
    pub fn new(service: &'a RecognitionService) -> Self {
        Self { service }
    }

    /// Import enrollments from CSV
    pub async fn import_enrollments_csv<R: Read>(
        &self,
        reader: R,
        options: ImportOptions,
    ) -> Result<ImportResult> {
        let parsed = read_enrollments_csv(reader)?;
        let count = parsed.records.len();

        if !(options.dry_run || options.validate_only) {
            self.service
                .add_enrollments(&parsed.records)
                .await
                .context("Failed to store enrollments")?;
        }

        Ok(ImportResult {
            imported: count,
            skipped: parsed.errors.len(),
            errors: parsed.errors,
        })
    }

    /// Import products from CSV
    pub async fn import_products_csv<R: Read>(
        &self,
        reader: R,
        options: ImportOptions,
    ) -> Result<ImportResult> {
        let parsed = read_products_csv(reader)?;
        let count = parsed.records.len();

        if !(options.dry_run || options.validate_only) {
            self.service
                .add_products(&parsed.records)
                .await
                .context("Failed to store products")?;
        }

        Ok(ImportResult {
            imported: count,
            skipped: parsed.errors.len(),
            errors: parsed.errors,
        })
    }
}
