use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Reconciliation, RecordIssue};

use super::{BatchOptions, BatchResult};

/// Machine-readable description of one run, written next to the CSV files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub version: String,
    /// Where the input came from (database path or CSV files)
    pub source: String,
    pub options: BatchOptions,
    pub record_count: usize,
    pub ledger_rows: usize,
    pub summary_rows: usize,
    pub issues: Vec<RecordIssue>,
    pub reconciliation: Reconciliation,
    pub files: Vec<String>,
}

impl RunReport {
    pub fn new(source: impl Into<String>, options: &BatchOptions, batch: &BatchResult) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            source: source.into(),
            options: options.clone(),
            record_count: batch.traces.len(),
            ledger_rows: batch.ledger.len(),
            summary_rows: batch.summaries.len(),
            issues: batch.issues.clone(),
            reconciliation: batch.reconciliation.clone(),
            files: Vec::new(),
        }
    }
}

/// Row counts of the input tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetStats {
    pub enrollments: i64,
    pub products: i64,
    /// Enrollments whose product id matches no product
    pub unmatched_enrollments: i64,
}
