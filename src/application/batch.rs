use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{
    AllocationEntry, Cents, CourseSummary, JoinedRecord, Reconciliation, RecordIssue,
    ResolvedInterval, TraceEntry, aggregate, allocate, reconcile, record, resolve,
};

/// Options controlling a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOptions {
    /// Process records on the rayon thread pool
    pub parallel: bool,
    /// Allowed difference when reconciling totals
    pub tolerance_cents: Cents,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            tolerance_cents: 1,
        }
    }
}

/// Everything one enrollment contributes to a run.
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub resolved: ResolvedInterval,
    pub trace: TraceEntry,
    pub entries: Vec<AllocationEntry>,
    pub issue: Option<RecordIssue>,
}

/// Output of a full run: ledger, audit trail, summaries and reconciliation.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub ledger: Vec<AllocationEntry>,
    pub traces: Vec<TraceEntry>,
    pub summaries: Vec<CourseSummary>,
    pub issues: Vec<RecordIssue>,
    pub reconciliation: Reconciliation,
}

impl BatchResult {
    pub fn skipped(&self) -> impl Iterator<Item = &RecordIssue> {
        self.issues.iter().filter(|issue| issue.is_skipped())
    }
}

/// Resolve, trace and allocate a single enrollment. Never fails: problems
/// are returned as an issue next to whatever could be allocated.
pub fn process_record(input: &JoinedRecord) -> RecordOutcome {
    let code = input.enrollment.enrollment_code.as_str();
    let resolved = resolve(input);
    let trace = record(input, &resolved);
    debug!(enrollment_code = code, origin = %trace.origin, "Resolved interval");

    let entries = match allocate(&input.enrollment, &resolved) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(enrollment_code = code, "{}", err);
            Vec::new()
        }
    };

    let issue = RecordIssue::detect(code, &resolved, !entries.is_empty());
    if let Some(issue) = &issue {
        warn!(enrollment_code = code, "{}", issue);
    }

    RecordOutcome {
        resolved,
        trace,
        entries,
        issue,
    }
}

/// Run the whole batch. Records are independent, so they are mapped in
/// parallel and merged in input order.
pub fn process_batch(records: &[JoinedRecord], options: &BatchOptions) -> BatchResult {
    info!(
        records = records.len(),
        parallel = options.parallel,
        "Processing revenue allocation"
    );

    let outcomes: Vec<RecordOutcome> = if options.parallel {
        records.par_iter().map(process_record).collect()
    } else {
        records.iter().map(process_record).collect()
    };

    let mut ledger = Vec::new();
    let mut traces = Vec::with_capacity(outcomes.len());
    let mut issues = Vec::new();
    for outcome in outcomes {
        ledger.extend(outcome.entries);
        traces.push(outcome.trace);
        issues.extend(outcome.issue);
    }

    let summaries = aggregate(&ledger);

    let fees: Vec<(String, Cents)> = records
        .iter()
        .map(|r| (r.enrollment.enrollment_code.clone(), r.enrollment.amount_cents))
        .collect();
    let unallocated: Vec<String> = issues
        .iter()
        .filter(|issue| issue.is_skipped())
        .map(|issue| issue.enrollment_code().to_string())
        .collect();
    let reconciliation = reconcile(&fees, &summaries, &unallocated, options.tolerance_cents);

    if reconciliation.is_balanced() {
        info!(
            ledger_rows = ledger.len(),
            issues = issues.len(),
            "Allocation complete"
        );
    } else {
        warn!(
            difference = reconciliation.difference(),
            mismatches = reconciliation.mismatches.len(),
            "Ledger does not reconcile with input fees"
        );
    }

    BatchResult {
        ledger,
        traces,
        summaries,
        issues,
        reconciliation,
    }
}
