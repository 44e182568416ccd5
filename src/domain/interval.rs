use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use super::JoinedRecord;

/// A month is approximated as 30 days when only a duration is known.
pub const DAYS_PER_MONTH: f64 = 30.0;

/// Which resolution rule produced an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Online,
    OnlineMissingEnrollmentDate,
    Recognition,
    Product,
    EnrollmentPlusDuration,
    FallbackPending,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Online => "ONLINE",
            Origin::OnlineMissingEnrollmentDate => "ONLINE: missing enrollment date",
            Origin::Recognition => "Recognition",
            Origin::Product => "Product",
            Origin::EnrollmentPlusDuration => "Enrollment + duration",
            Origin::FallbackPending => "Fallback pending",
        }
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Closed date range, both endpoints included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateInterval {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateInterval {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn single_day(date: NaiveDate) -> Self {
        Self::new(date, date)
    }

    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }

    /// Number of days covered, `end - start + 1`. Zero for an invalid interval.
    pub fn num_days(&self) -> i64 {
        if self.is_valid() {
            (self.end - self.start).num_days() + 1
        } else {
            0
        }
    }

    /// Every date in the interval, in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start
            .iter_days()
            .take_while(move |day| *day <= self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStatus {
    Resolved,
    Invalid,
    Unresolved,
}

impl ResolutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStatus::Resolved => "resolved",
            ResolutionStatus::Invalid => "invalid",
            ResolutionStatus::Unresolved => "unresolved",
        }
    }
}

/// Outcome of date-range resolution for one enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ResolvedInterval {
    Resolved {
        interval: DateInterval,
        origin: Origin,
    },
    /// A rule matched but produced start > end.
    Invalid {
        attempted: DateInterval,
        origin: Origin,
    },
    Unresolved {
        origin: Origin,
    },
}

impl ResolvedInterval {
    fn from_candidate(interval: DateInterval, origin: Origin) -> Self {
        if interval.is_valid() {
            ResolvedInterval::Resolved { interval, origin }
        } else {
            ResolvedInterval::Invalid {
                attempted: interval,
                origin,
            }
        }
    }

    pub fn origin(&self) -> Origin {
        match self {
            ResolvedInterval::Resolved { origin, .. }
            | ResolvedInterval::Invalid { origin, .. }
            | ResolvedInterval::Unresolved { origin } => *origin,
        }
    }

    /// The usable interval. `None` when unresolved or invalid.
    pub fn interval(&self) -> Option<DateInterval> {
        match self {
            ResolvedInterval::Resolved { interval, .. } => Some(*interval),
            _ => None,
        }
    }

    /// The dates a rule produced, valid or not.
    pub fn attempted(&self) -> Option<DateInterval> {
        match self {
            ResolvedInterval::Resolved { interval, .. } => Some(*interval),
            ResolvedInterval::Invalid { attempted, .. } => Some(*attempted),
            ResolvedInterval::Unresolved { .. } => None,
        }
    }

    pub fn status(&self) -> ResolutionStatus {
        match self {
            ResolvedInterval::Resolved { .. } => ResolutionStatus::Resolved,
            ResolvedInterval::Invalid { .. } => ResolutionStatus::Invalid,
            ResolvedInterval::Unresolved { .. } => ResolutionStatus::Unresolved,
        }
    }

    /// Audit label. Invalid attempts keep the rule name plus a marker.
    pub fn origin_label(&self) -> String {
        match self {
            ResolvedInterval::Invalid { origin, .. } => format!("{} (start after end)", origin),
            ResolvedInterval::Unresolved {
                origin: Origin::EnrollmentPlusDuration,
            } => format!("{} (end date out of range)", Origin::EnrollmentPlusDuration),
            other => other.origin().as_str().to_string(),
        }
    }
}

type Rule = fn(&JoinedRecord) -> Option<ResolvedInterval>;

/// Resolution rules in priority order. The first rule that applies wins.
const RULES: [Rule; 4] = [
    online_rule,
    recognition_rule,
    product_rule,
    duration_rule,
];

/// Decide the interval over which an enrollment's fee is recognised.
pub fn resolve(record: &JoinedRecord) -> ResolvedInterval {
    RULES
        .iter()
        .find_map(|rule| rule(record))
        .unwrap_or(ResolvedInterval::Unresolved {
            origin: Origin::FallbackPending,
        })
}

fn online_rule(record: &JoinedRecord) -> Option<ResolvedInterval> {
    if !record.modality()?.is_online() {
        return None;
    }
    Some(match record.enrollment.enrollment_date {
        Some(date) => ResolvedInterval::Resolved {
            interval: DateInterval::single_day(date),
            origin: Origin::Online,
        },
        None => ResolvedInterval::Unresolved {
            origin: Origin::OnlineMissingEnrollmentDate,
        },
    })
}

fn recognition_rule(record: &JoinedRecord) -> Option<ResolvedInterval> {
    let product = record.product.as_ref()?;
    let interval = DateInterval::new(product.recognition_start?, product.recognition_end?);
    Some(ResolvedInterval::from_candidate(interval, Origin::Recognition))
}

fn product_rule(record: &JoinedRecord) -> Option<ResolvedInterval> {
    let product = record.product.as_ref()?;
    let interval = DateInterval::new(product.start_date?, product.end_date?);
    Some(ResolvedInterval::from_candidate(interval, Origin::Product))
}

fn duration_rule(record: &JoinedRecord) -> Option<ResolvedInterval> {
    let start = record.enrollment.enrollment_date?;
    let months = record.product.as_ref()?.duration_months?;
    if !months.is_finite() || months <= 0.0 {
        return None;
    }
    let days = (months * DAYS_PER_MONTH).round() as u64;
    let Some(end) = start.checked_add_days(Days::new(days)) else {
        return Some(ResolvedInterval::Unresolved {
            origin: Origin::EnrollmentPlusDuration,
        });
    };
    Some(ResolvedInterval::from_candidate(
        DateInterval::new(start, end),
        Origin::EnrollmentPlusDuration,
    ))
}
