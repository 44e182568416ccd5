use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Cents, DateInterval, EnrollmentRecord, ProductId, ResolvedInterval, divide_rounded};

/// One day's share of an enrollment fee. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationEntry {
    pub date: NaiveDate,
    pub enrollment_code: String,
    pub product_id: Option<ProductId>,
    pub amount_cents: Cents,
}

/// Split `amount` over every day of `interval`.
///
/// Each day but the last gets `amount / N` rounded to the cent; the last day
/// gets whatever is left, so the shares always sum to `amount` exactly.
pub fn split_daily(amount: Cents, interval: &DateInterval) -> Vec<(NaiveDate, Cents)> {
    let num_days = interval.num_days();
    if num_days <= 1 {
        return vec![(interval.start, amount)];
    }

    let per_day = divide_rounded(amount, num_days);
    let last_day = amount - per_day * (num_days - 1);

    interval
        .days()
        .enumerate()
        .map(|(i, day)| {
            let share = if i as i64 == num_days - 1 {
                last_day
            } else {
                per_day
            };
            (day, share)
        })
        .collect()
}

/// Produce the ledger rows for one enrollment.
///
/// Unresolved and invalid intervals fall back to a single entry on the
/// enrollment date. Without that date nothing can be allocated.
pub fn allocate(
    enrollment: &EnrollmentRecord,
    resolved: &ResolvedInterval,
) -> Result<Vec<AllocationEntry>, AllocationError> {
    let interval = match resolved.interval() {
        Some(interval) => interval,
        None => {
            let date = enrollment.enrollment_date.ok_or_else(|| {
                AllocationError::NoAllocationPossible {
                    enrollment_code: enrollment.enrollment_code.clone(),
                }
            })?;
            DateInterval::single_day(date)
        }
    };

    Ok(split_daily(enrollment.amount_cents, &interval)
        .into_iter()
        .map(|(date, amount_cents)| AllocationEntry {
            date,
            enrollment_code: enrollment.enrollment_code.clone(),
            product_id: enrollment.product_id.clone(),
            amount_cents,
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    NoAllocationPossible { enrollment_code: String },
}

impl std::fmt::Display for AllocationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllocationError::NoAllocationPossible { enrollment_code } => write!(
                f,
                "No allocation possible for {}: no interval and no enrollment date",
                enrollment_code
            ),
        }
    }
}

impl std::error::Error for AllocationError {}
