// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use chrono::NaiveDate;
use revrec::application::RecognitionService;
use revrec::domain::{EnrollmentRecord, JoinedRecord, Modality, ProductRecord};
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(RecognitionService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = RecognitionService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Helper to parse a date string into NaiveDate
pub fn parse_date(date_str: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap()
}

/// Test fixture: a small product catalogue
pub struct StandardCatalogue;

impl StandardCatalogue {
    /// In-person course with a recognition window of 2024-01-01..2024-01-03
    pub fn short_course() -> ProductRecord {
        ProductRecord::new("C-SHORT", Modality::from_str("PRESENCIAL"))
            .with_product_window(parse_date("2023-12-01"), parse_date("2024-02-29"))
            .with_recognition_window(parse_date("2024-01-01"), parse_date("2024-01-03"))
    }

    pub fn online_course() -> ProductRecord {
        ProductRecord::new("C-ONLINE", Modality::Online)
            .with_product_window(parse_date("2024-01-01"), parse_date("2024-12-31"))
    }

    /// Only a duration is known
    pub fn duration_course() -> ProductRecord {
        ProductRecord::new("C-MONTHS", Modality::from_str("MIXED")).with_duration_months(3.0)
    }

    /// Recognition window is inverted and nothing else is set
    pub fn broken_course() -> ProductRecord {
        ProductRecord::new("C-BROKEN", Modality::from_str("PRESENCIAL"))
            .with_recognition_window(parse_date("2024-05-01"), parse_date("2024-04-01"))
    }

    pub fn all() -> Vec<ProductRecord> {
        vec![
            Self::short_course(),
            Self::online_course(),
            Self::duration_course(),
            Self::broken_course(),
        ]
    }

    /// Store the catalogue in the service's database
    pub async fn create(service: &RecognitionService) -> Result<()> {
        service.add_products(&Self::all()).await?;
        Ok(())
    }
}

/// Build an enrollment joined to `product`
pub fn joined(
    code: &str,
    amount: i64,
    date: Option<&str>,
    product: Option<ProductRecord>,
) -> JoinedRecord {
    let mut enrollment = EnrollmentRecord::new(code, amount);
    enrollment.enrollment_date = date.map(parse_date);
    enrollment.product_id = product.as_ref().map(|p| p.product_id.clone());
    JoinedRecord::new(enrollment, product)
}
