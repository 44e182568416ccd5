mod common;

use anyhow::Result;
use common::{StandardCatalogue, parse_date, test_service};
use revrec::application::{AppError, BatchOptions, RecognitionService};
use revrec::domain::{EnrollmentRecord, Origin, ResolutionStatus};

async fn enroll(
    service: &RecognitionService,
    code: &str,
    amount: i64,
    date: Option<&str>,
    product: Option<&str>,
) -> Result<()> {
    let mut enrollment = EnrollmentRecord::new(code, amount);
    enrollment.enrollment_date = date.map(parse_date);
    enrollment.product_id = product.map(str::to_string);
    service.add_enrollments(&[enrollment]).await?;
    Ok(())
}

#[tokio::test]
async fn test_joined_records_left_join() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardCatalogue::create(&service).await?;

    enroll(&service, "E1", 9000, Some("2023-12-01"), Some("C-SHORT")).await?;
    enroll(&service, "E2", 5000, Some("2024-01-01"), Some("NOPE")).await?;
    enroll(&service, "E3", 5000, None, None).await?;

    let records = service.joined_records().await?;

    assert_eq!(records.len(), 3);
    let e1 = &records[0];
    assert_eq!(e1.enrollment.enrollment_code, "E1");
    let product = e1.product.as_ref().expect("E1 should match a product");
    assert_eq!(product.recognition_start, Some(parse_date("2024-01-01")));
    assert_eq!(product.end_date, Some(parse_date("2024-02-29")));
    assert!(records[1].product.is_none());
    assert_eq!(records[1].enrollment.product_id.as_deref(), Some("NOPE"));
    assert!(records[2].product.is_none());
    assert_eq!(records[2].enrollment.enrollment_date, None);

    Ok(())
}

#[tokio::test]
async fn test_stats_counts_unmatched() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardCatalogue::create(&service).await?;

    enroll(&service, "E1", 100, Some("2024-01-01"), Some("C-ONLINE")).await?;
    enroll(&service, "E2", 100, Some("2024-01-01"), Some("MISSING")).await?;
    enroll(&service, "E3", 100, Some("2024-01-01"), None).await?;

    let stats = service.stats().await?;
    assert_eq!(stats.enrollments, 3);
    assert_eq!(stats.products, 4);
    assert_eq!(stats.unmatched_enrollments, 2);

    Ok(())
}

#[tokio::test]
async fn test_saving_twice_replaces() -> Result<()> {
    let (service, _temp) = test_service().await?;

    enroll(&service, "E1", 100, Some("2024-01-01"), None).await?;
    enroll(&service, "E1", 250, Some("2024-02-01"), None).await?;

    let enrollment = service.get_enrollment("E1").await?;
    assert_eq!(enrollment.amount_cents, 250);
    assert_eq!(enrollment.enrollment_date, Some(parse_date("2024-02-01")));
    assert_eq!(service.stats().await?.enrollments, 1);

    Ok(())
}

#[tokio::test]
async fn test_negative_amount_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let result = service
        .add_enrollments(&[EnrollmentRecord::new("E1", -100)])
        .await;
    assert!(matches!(result, Err(AppError::InvalidAmount { .. })));
    assert_eq!(service.stats().await?.enrollments, 0);

    Ok(())
}

#[tokio::test]
async fn test_blank_identifiers_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let result = service
        .add_enrollments(&[EnrollmentRecord::new("  ", 100)])
        .await;
    assert!(matches!(result, Err(AppError::InvalidRecord(_))));

    let mut product = StandardCatalogue::online_course();
    product.product_id = String::new();
    let result = service.add_products(&[product]).await;
    assert!(matches!(result, Err(AppError::InvalidRecord(_))));

    let stats = service.stats().await?;
    assert_eq!(stats.enrollments, 0);
    assert_eq!(stats.products, 0);

    Ok(())
}

#[tokio::test]
async fn test_run_over_database() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardCatalogue::create(&service).await?;

    enroll(&service, "E1", 9000, Some("2023-12-01"), Some("C-SHORT")).await?;
    enroll(&service, "E2", 10000, Some("2024-02-10"), Some("C-ONLINE")).await?;
    enroll(&service, "E3", 7700, None, Some("C-ONLINE")).await?;

    let result = service.run(&BatchOptions::default()).await?;

    assert_eq!(result.traces.len(), 3);
    assert_eq!(result.ledger.len(), 4);
    assert_eq!(result.summaries.len(), 2);
    assert_eq!(result.issues.len(), 1);

    let rec = &result.reconciliation;
    assert_eq!(rec.input_total, 26700);
    assert_eq!(rec.allocated_total, 19000);
    assert_eq!(rec.unallocated_total, 7700);
    assert!(rec.is_balanced());

    Ok(())
}

#[tokio::test]
async fn test_explain_single_enrollment() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardCatalogue::create(&service).await?;
    enroll(&service, "E9", 25000, Some("2024-03-15"), Some("C-BROKEN")).await?;

    let (record, outcome) = service.explain("E9").await?;

    assert_eq!(record.enrollment.amount_cents, 25000);
    assert_eq!(outcome.resolved.origin(), Origin::Recognition);
    assert_eq!(outcome.trace.status, ResolutionStatus::Invalid);
    assert_eq!(outcome.entries.len(), 1);
    assert_eq!(outcome.entries[0].date, parse_date("2024-03-15"));

    Ok(())
}

#[tokio::test]
async fn test_explain_unknown_enrollment() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let result = service.explain("NOPE").await;
    assert!(matches!(result, Err(AppError::EnrollmentNotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_connect_to_uninitialised_database_fails_run() -> Result<()> {
    let temp_dir = tempfile::TempDir::new()?;
    let db_path = temp_dir.path().join("missing.db");

    // Opening a file that does not exist fails before any processing
    let result = RecognitionService::connect(db_path.to_str().unwrap()).await;
    assert!(matches!(result, Err(AppError::Database(_))));

    Ok(())
}
