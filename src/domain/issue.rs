use std::fmt;

use serde::{Deserialize, Serialize};

use super::{DateInterval, Origin, ResolvedInterval};

/// Per-record failure modes. They degrade to fallbacks and are reported,
/// never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordIssue {
    /// Nothing could be allocated because the enrollment has no date.
    MissingEnrollmentDate {
        enrollment_code: String,
        origin: Origin,
    },
    /// No rule applied; allocated on the enrollment date.
    UnresolvedInterval { enrollment_code: String },
    /// A rule produced start > end; allocated on the enrollment date.
    InvalidInterval {
        enrollment_code: String,
        origin: Origin,
        attempted: DateInterval,
    },
}

impl RecordIssue {
    /// Classify the outcome of resolution and allocation for one record.
    /// Returns `None` when the interval resolved cleanly.
    pub fn detect(
        enrollment_code: &str,
        resolved: &ResolvedInterval,
        allocated: bool,
    ) -> Option<Self> {
        let enrollment_code = enrollment_code.to_string();
        if !allocated {
            return Some(RecordIssue::MissingEnrollmentDate {
                enrollment_code,
                origin: resolved.origin(),
            });
        }
        match *resolved {
            ResolvedInterval::Resolved { .. } => None,
            ResolvedInterval::Invalid { attempted, origin } => Some(RecordIssue::InvalidInterval {
                enrollment_code,
                origin,
                attempted,
            }),
            ResolvedInterval::Unresolved { .. } => {
                Some(RecordIssue::UnresolvedInterval { enrollment_code })
            }
        }
    }

    pub fn enrollment_code(&self) -> &str {
        match self {
            RecordIssue::MissingEnrollmentDate {
                enrollment_code, ..
            }
            | RecordIssue::UnresolvedInterval { enrollment_code }
            | RecordIssue::InvalidInterval {
                enrollment_code, ..
            } => enrollment_code,
        }
    }

    /// True when the record produced no ledger rows at all.
    pub fn is_skipped(&self) -> bool {
        matches!(self, RecordIssue::MissingEnrollmentDate { .. })
    }
}

impl fmt::Display for RecordIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordIssue::MissingEnrollmentDate {
                enrollment_code,
                origin,
            } => write!(
                f,
                "{}: no enrollment date ({}), skipped from ledger",
                enrollment_code, origin
            ),
            RecordIssue::UnresolvedInterval { enrollment_code } => write!(
                f,
                "{}: no valid dates found, using enrollment date",
                enrollment_code
            ),
            RecordIssue::InvalidInterval {
                enrollment_code,
                origin,
                attempted,
            } => write!(
                f,
                "{}: {} interval {} > {} is invalid, using enrollment date",
                enrollment_code, origin, attempted.start, attempted.end
            ),
        }
    }
}

impl std::error::Error for RecordIssue {}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn test_detect_clean_resolution() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let resolved = ResolvedInterval::Resolved {
            interval: DateInterval::single_day(day),
            origin: Origin::Online,
        };
        assert_eq!(RecordIssue::detect("E1", &resolved, true), None);
    }

    #[test]
    fn test_detect_missing_date_wins() {
        let resolved = ResolvedInterval::Unresolved {
            origin: Origin::OnlineMissingEnrollmentDate,
        };
        let issue = RecordIssue::detect("E1", &resolved, false).unwrap();
        assert!(issue.is_skipped());
        assert_eq!(issue.enrollment_code(), "E1");
        assert_eq!(
            issue.to_string(),
            "E1: no enrollment date (ONLINE: missing enrollment date), skipped from ledger"
        );
    }

    #[test]
    fn test_detect_invalid_interval() {
        let attempted = DateInterval::new(
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
        );
        let resolved = ResolvedInterval::Invalid {
            attempted,
            origin: Origin::Product,
        };
        let issue = RecordIssue::detect("E7", &resolved, true).unwrap();
        assert!(!issue.is_skipped());
        assert!(matches!(issue, RecordIssue::InvalidInterval { .. }));
        assert_eq!(
            issue.to_string(),
            "E7: Product interval 2024-05-01 > 2024-04-01 is invalid, using enrollment date"
        );
    }
}
