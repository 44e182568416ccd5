mod common;

use anyhow::Result;
use common::test_service;
use revrec::application::{BatchOptions, RunReport, process_batch};
use revrec::domain::join_records;
use revrec::io::{
    ExportOptions, Exporter, ImportOptions, Importer, LEDGER_FILE, REPORT_FILE, SUMMARY_FILE,
    TRACE_FILE, read_enrollments_csv, read_products_csv,
};
use tempfile::TempDir;

const PRODUCTS_CSV: &str = "\
product_id,modality,start_date,end_date,recognition_start,recognition_end,duration_months
C1,PRESENCIAL,2023-12-01,2024-02-29,2024-01-01,2024-01-03,
C2,ONLINE,,,,,
C3,MIXED,,,,,1
";

const ENROLLMENTS_CSV: &str = "\
enrollment_code,enrollment_date,amount,product_id
E1,2023-12-01,90.00,C1
E2,2024-02-10 09:30:00,100.00,C2
E3,,42.00,C2
E4,2024-01-01,100.00,C3
";

#[tokio::test]
async fn test_import_then_run() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let importer = Importer::new(&service);

    let products = importer
        .import_products_csv(PRODUCTS_CSV.as_bytes(), ImportOptions::default())
        .await?;
    assert_eq!(products.imported, 3);
    assert!(products.errors.is_empty());

    let enrollments = importer
        .import_enrollments_csv(ENROLLMENTS_CSV.as_bytes(), ImportOptions::default())
        .await?;
    assert_eq!(enrollments.imported, 4);

    let result = service.run(&BatchOptions::default()).await?;

    // E1: 3 days, E2: 1 day, E3: skipped, E4: 31 days
    assert_eq!(result.ledger.len(), 35);
    assert_eq!(result.traces.len(), 4);
    let e4_total: i64 = result
        .ledger
        .iter()
        .filter(|e| e.enrollment_code == "E4")
        .map(|e| e.amount_cents)
        .sum();
    assert_eq!(e4_total, 10000);
    assert!(result.reconciliation.is_balanced());

    Ok(())
}

#[tokio::test]
async fn test_dry_run_stores_nothing() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let importer = Importer::new(&service);

    let result = importer
        .import_enrollments_csv(
            ENROLLMENTS_CSV.as_bytes(),
            ImportOptions {
                dry_run: true,
                ..ImportOptions::default()
            },
        )
        .await?;

    assert_eq!(result.imported, 4);
    assert_eq!(service.stats().await?.enrollments, 0);

    Ok(())
}

#[tokio::test]
async fn test_bad_rows_do_not_block_valid_ones() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let importer = Importer::new(&service);
    let csv = "\
enrollment_code,enrollment_date,amount,product_id
E1,2024-01-01,90.00,C1
E2,2024-01-01,-5.00,C1
E1,2024-03-01,12.00,C1
";

    let result = importer
        .import_enrollments_csv(csv.as_bytes(), ImportOptions::default())
        .await?;

    assert_eq!(result.imported, 1);
    assert_eq!(result.skipped, 2);
    assert_eq!(result.errors[0].line, 3);
    assert_eq!(result.errors[0].field.as_deref(), Some("amount"));
    assert_eq!(service.stats().await?.enrollments, 1);
    assert_eq!(service.get_enrollment("E1").await?.amount_cents, 9000);

    Ok(())
}

#[test]
fn test_file_run_ignores_repeated_and_negative_rows() -> Result<()> {
    let csv = "\
enrollment_code,enrollment_date,amount,product_id
E1,2024-01-01,90.00,C2
E1,2024-01-01,90.00,C2
E3,2024-01-01,-5.00,C2
";
    let enrollments = read_enrollments_csv(csv.as_bytes())?;
    let products = read_products_csv(PRODUCTS_CSV.as_bytes())?;
    assert_eq!(enrollments.errors.len(), 2);

    let records = join_records(enrollments.records, &products.records);
    let batch = process_batch(&records, &BatchOptions::default());

    assert_eq!(batch.ledger.len(), 1);
    assert_eq!(batch.ledger[0].amount_cents, 9000);
    assert!(batch.reconciliation.is_balanced());

    Ok(())
}

#[test]
fn test_write_run_files() -> Result<()> {
    let enrollments = read_enrollments_csv(ENROLLMENTS_CSV.as_bytes())?;
    let products = read_products_csv(PRODUCTS_CSV.as_bytes())?;
    let records = join_records(enrollments.records, &products.records);
    let options = BatchOptions::default();
    let batch = process_batch(&records, &options);

    let out = TempDir::new()?;
    let mut report = RunReport::new("fixtures", &options, &batch);
    let written = Exporter::new(
        &batch,
        ExportOptions {
            excel_bom: false,
            json_report: true,
        },
    )
    .write_all(out.path(), &mut report)?;

    assert_eq!(written.len(), 4);
    assert_eq!(report.files.len(), 4);

    let ledger = std::fs::read_to_string(out.path().join(LEDGER_FILE))?;
    let mut lines = ledger.lines();
    assert_eq!(lines.next(), Some("date,enrollment_code,product_id,amount"));
    assert_eq!(lines.next(), Some("2024-01-01,E1,C1,30.00"));
    assert_eq!(lines.next(), Some("2024-01-02,E1,C1,30.00"));
    assert_eq!(lines.next(), Some("2024-01-03,E1,C1,30.00"));
    assert_eq!(lines.next(), Some("2024-02-10,E2,C2,100.00"));

    let trace = std::fs::read_to_string(out.path().join(TRACE_FILE))?;
    assert_eq!(trace.lines().count(), 5);
    assert!(
        trace
            .lines()
            .any(|l| l.starts_with("E3,") && l.ends_with(",unresolved,ONLINE: missing enrollment date"))
    );

    let summary = std::fs::read_to_string(out.path().join(SUMMARY_FILE))?;
    assert!(summary.lines().any(|l| l == "C1,E1,90.00"));
    assert!(summary.lines().any(|l| l == "C3,E4,100.00"));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.path().join(REPORT_FILE))?)?;
    assert_eq!(json["record_count"], 4);
    assert_eq!(json["reconciliation"]["unallocated_total"], 4200);
    assert_eq!(json["issues"][0]["kind"], "missing_enrollment_date");

    Ok(())
}
