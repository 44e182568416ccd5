use thiserror::Error;

use crate::domain::Cents;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Enrollment not found: {0}")]
    EnrollmentNotFound(String),

    #[error("Invalid amount for enrollment {enrollment_code}: {amount_cents} cents (must not be negative)")]
    InvalidAmount {
        enrollment_code: String,
        amount_cents: Cents,
    },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}
