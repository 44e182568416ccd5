use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Cents, JoinedRecord, ResolutionStatus, ResolvedInterval};

/// Audit row explaining how one enrollment's interval was chosen.
/// Exactly one per enrollment, whatever happened during allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub enrollment_code: String,
    pub amount_cents: Cents,
    pub modality: Option<String>,
    pub enrollment_date: Option<NaiveDate>,
    pub product_start: Option<NaiveDate>,
    pub product_end: Option<NaiveDate>,
    pub recognition_start: Option<NaiveDate>,
    pub recognition_end: Option<NaiveDate>,
    pub duration_months: Option<f64>,
    /// Dates the winning rule produced (kept for invalid attempts too)
    pub resolved_start: Option<NaiveDate>,
    pub resolved_end: Option<NaiveDate>,
    pub status: ResolutionStatus,
    pub origin: String,
}

/// Capture the inputs and the resolver's decision. Makes no decisions itself.
pub fn record(input: &JoinedRecord, resolved: &ResolvedInterval) -> TraceEntry {
    let product = input.product.as_ref();
    let attempted = resolved.attempted();

    TraceEntry {
        enrollment_code: input.enrollment.enrollment_code.clone(),
        amount_cents: input.enrollment.amount_cents,
        modality: product.map(|p| p.modality.as_str().to_string()),
        enrollment_date: input.enrollment.enrollment_date,
        product_start: product.and_then(|p| p.start_date),
        product_end: product.and_then(|p| p.end_date),
        recognition_start: product.and_then(|p| p.recognition_start),
        recognition_end: product.and_then(|p| p.recognition_end),
        duration_months: product.and_then(|p| p.duration_months),
        resolved_start: attempted.map(|i| i.start),
        resolved_end: attempted.map(|i| i.end),
        status: resolved.status(),
        origin: resolved.origin_label(),
    }
}
