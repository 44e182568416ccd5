use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::{AllocationEntry, Cents, ProductId};

/// Total allocated to one enrollment of one course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSummary {
    pub product_id: Option<ProductId>,
    pub enrollment_code: String,
    pub amount_cents: Cents,
}

/// Group the ledger by (product, enrollment) and sum the amounts.
/// Output is sorted by product id, then enrollment code.
pub fn aggregate(ledger: &[AllocationEntry]) -> Vec<CourseSummary> {
    let mut totals: BTreeMap<(Option<&str>, &str), Cents> = BTreeMap::new();

    for entry in ledger {
        let key = (entry.product_id.as_deref(), entry.enrollment_code.as_str());
        *totals.entry(key).or_insert(0) += entry.amount_cents;
    }

    totals
        .into_iter()
        .map(|((product_id, enrollment_code), amount_cents)| CourseSummary {
            product_id: product_id.map(str::to_string),
            enrollment_code: enrollment_code.to_string(),
            amount_cents,
        })
        .collect()
}

/// An enrollment whose summed allocation differs from its fee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    pub enrollment_code: String,
    pub expected: Cents,
    pub allocated: Cents,
}

/// Reconciliation of a batch's ledger against its input fees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub record_count: usize,
    pub allocated_count: usize,
    pub unallocated_count: usize,
    pub input_total: Cents,
    pub allocated_total: Cents,
    /// Fees of enrollments for which no allocation was possible
    pub unallocated_total: Cents,
    pub tolerance: Cents,
    pub mismatches: Vec<Mismatch>,
}

impl Reconciliation {
    /// Input total not explained by allocated or unallocated amounts.
    pub fn difference(&self) -> Cents {
        self.input_total - self.allocated_total - self.unallocated_total
    }

    pub fn is_balanced(&self) -> bool {
        self.difference().abs() <= self.tolerance && self.mismatches.is_empty()
    }
}

/// Check every summary against the fee it came from.
///
/// `fees` holds (enrollment code, fee) for every input record; `unallocated`
/// lists the codes that produced no ledger rows. Records sharing a code are
/// checked against their combined fee.
pub fn reconcile(
    fees: &[(String, Cents)],
    summaries: &[CourseSummary],
    unallocated: &[String],
    tolerance: Cents,
) -> Reconciliation {
    let mut allocated_by_code: HashMap<&str, Cents> = HashMap::new();
    for summary in summaries {
        *allocated_by_code
            .entry(summary.enrollment_code.as_str())
            .or_insert(0) += summary.amount_cents;
    }

    // Combined fee per code, in first-seen order
    let mut fee_by_code: Vec<(&str, Cents)> = Vec::new();
    let mut position: HashMap<&str, usize> = HashMap::new();
    for (code, fee) in fees {
        match position.get(code.as_str()) {
            Some(&idx) => fee_by_code[idx].1 += fee,
            None => {
                position.insert(code.as_str(), fee_by_code.len());
                fee_by_code.push((code.as_str(), *fee));
            }
        }
    }

    let skipped: HashSet<&str> = unallocated.iter().map(String::as_str).collect();
    let unallocated_count = fees
        .iter()
        .filter(|(code, _)| skipped.contains(code.as_str()))
        .count();

    let mut unallocated_total = 0;
    let mut mismatches = Vec::new();
    for (code, fee) in fee_by_code {
        if skipped.contains(code) {
            unallocated_total += fee;
            continue;
        }
        let allocated = allocated_by_code.get(code).copied().unwrap_or(0);
        if (allocated - fee).abs() > tolerance {
            mismatches.push(Mismatch {
                enrollment_code: code.to_string(),
                expected: fee,
                allocated,
            });
        }
    }

    Reconciliation {
        record_count: fees.len(),
        allocated_count: fees.len() - unallocated_count,
        unallocated_count,
        input_total: fees.iter().map(|(_, fee)| fee).sum(),
        allocated_total: summaries.iter().map(|s| s.amount_cents).sum(),
        unallocated_total,
        tolerance,
        mismatches,
    }
}
