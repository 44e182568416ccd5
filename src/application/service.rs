use tracing::info;

use crate::domain::{EnrollmentRecord, JoinedRecord, ProductRecord};
use crate::storage::Repository;

use super::{
    AppError, BatchOptions, BatchResult, DatasetStats, RecordOutcome, process_batch,
    process_record,
};

/// Application service providing high-level operations over the stored
/// enrollments and products. This is the primary interface for any client.
pub struct RecognitionService {
    repo: Repository,
}

impl RecognitionService {
    /// Create a new service with the given repository.
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    // ========================
    // Input data
    // ========================

    /// Store products, replacing any with the same id.
    pub async fn add_products(&self, products: &[ProductRecord]) -> Result<(), AppError> {
        if let Some(bad) = products.iter().find(|p| p.product_id.trim().is_empty()) {
            return Err(AppError::InvalidRecord(format!(
                "product with empty id (modality {})",
                bad.modality
            )));
        }
        self.repo.save_products(products).await?;
        Ok(())
    }

    /// Store enrollments, replacing any with the same code.
    pub async fn add_enrollments(&self, enrollments: &[EnrollmentRecord]) -> Result<(), AppError> {
        for enrollment in enrollments {
            validate_enrollment(enrollment)?;
        }
        self.repo.save_enrollments(enrollments).await?;
        Ok(())
    }

    pub async fn get_enrollment(&self, code: &str) -> Result<EnrollmentRecord, AppError> {
        self.repo
            .get_enrollment(code)
            .await?
            .ok_or_else(|| AppError::EnrollmentNotFound(code.to_string()))
    }

    pub async fn stats(&self) -> Result<DatasetStats, AppError> {
        Ok(DatasetStats {
            enrollments: self.repo.count_enrollments().await?,
            products: self.repo.count_products().await?,
            unmatched_enrollments: self.repo.count_unmatched_enrollments().await?,
        })
    }

    /// Every enrollment left-joined to its product.
    pub async fn joined_records(&self) -> Result<Vec<JoinedRecord>, AppError> {
        let records = self.repo.fetch_joined_records().await?;
        info!(records = records.len(), "Fetched enrollments joined to products");
        Ok(records)
    }

    // ========================
    // Allocation
    // ========================

    /// Run the allocation over everything stored. A failure to read the input
    /// aborts before any record is processed.
    pub async fn run(&self, options: &BatchOptions) -> Result<BatchResult, AppError> {
        let records = self.joined_records().await?;
        Ok(process_batch(&records, options))
    }

    /// Resolve and allocate a single enrollment.
    pub async fn explain(&self, code: &str) -> Result<(JoinedRecord, RecordOutcome), AppError> {
        let record = self
            .repo
            .fetch_joined_record(code)
            .await?
            .ok_or_else(|| AppError::EnrollmentNotFound(code.to_string()))?;
        let outcome = process_record(&record);
        Ok((record, outcome))
    }
}

fn validate_enrollment(enrollment: &EnrollmentRecord) -> Result<(), AppError> {
    if enrollment.enrollment_code.trim().is_empty() {
        return Err(AppError::InvalidRecord(
            "enrollment with empty code".to_string(),
        ));
    }
    if enrollment.amount_cents < 0 {
        return Err(AppError::InvalidAmount {
            enrollment_code: enrollment.enrollment_code.clone(),
            amount_cents: enrollment.amount_cents,
        });
    }
    Ok(())
}
