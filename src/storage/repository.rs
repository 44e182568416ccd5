use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::{Row, SqlitePool};

use crate::domain::{EnrollmentRecord, JoinedRecord, Modality, ProductRecord};

use super::MIGRATION_001_INITIAL;

const DATE_FORMAT: &str = "%Y-%m-%d";

const JOINED_SELECT: &str = r#"
    SELECT e.enrollment_code, e.enrollment_date, e.amount_cents, e.product_id,
           p.product_id AS matched_product_id, p.modality, p.start_date, p.end_date,
           p.recognition_start, p.recognition_end, p.duration_months
    FROM enrollments e
    LEFT JOIN products p ON p.product_id = e.product_id
"#;

/// Repository for persisting enrollments and products and reading them back
/// joined.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // Products
    // ========================

    /// Insert or replace many products in one transaction.
    pub async fn save_products(&self, products: &[ProductRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to start transaction")?;
        for product in products {
            sqlx::query(
                r#"
                INSERT INTO products (product_id, modality, start_date, end_date, recognition_start, recognition_end, duration_months)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(product_id) DO UPDATE SET
                    modality = excluded.modality,
                    start_date = excluded.start_date,
                    end_date = excluded.end_date,
                    recognition_start = excluded.recognition_start,
                    recognition_end = excluded.recognition_end,
                    duration_months = excluded.duration_months
                "#,
            )
            .bind(&product.product_id)
            .bind(product.modality.as_str())
            .bind(format_date(product.start_date))
            .bind(format_date(product.end_date))
            .bind(format_date(product.recognition_start))
            .bind(format_date(product.recognition_end))
            .bind(product.duration_months)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to save product {}", product.product_id))?;
        }
        tx.commit().await.context("Failed to commit products")?;
        Ok(())
    }

    pub async fn count_products(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM products")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count products")?;
        Ok(row.get("count"))
    }

    // ========================
    // Enrollments
    // ========================

    /// Insert or replace many enrollments in one transaction.
    pub async fn save_enrollments(&self, enrollments: &[EnrollmentRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to start transaction")?;
        for enrollment in enrollments {
            sqlx::query(
                r#"
                INSERT INTO enrollments (enrollment_code, enrollment_date, amount_cents, product_id)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(enrollment_code) DO UPDATE SET
                    enrollment_date = excluded.enrollment_date,
                    amount_cents = excluded.amount_cents,
                    product_id = excluded.product_id
                "#,
            )
            .bind(&enrollment.enrollment_code)
            .bind(format_date(enrollment.enrollment_date))
            .bind(enrollment.amount_cents)
            .bind(&enrollment.product_id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to save enrollment {}", enrollment.enrollment_code))?;
        }
        tx.commit().await.context("Failed to commit enrollments")?;
        Ok(())
    }

    pub async fn get_enrollment(&self, code: &str) -> Result<Option<EnrollmentRecord>> {
        let row = sqlx::query(
            "SELECT enrollment_code, enrollment_date, amount_cents, product_id FROM enrollments WHERE enrollment_code = ?",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch enrollment")?;

        row.as_ref().map(Self::row_to_enrollment).transpose()
    }

    pub async fn count_enrollments(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM enrollments")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count enrollments")?;
        Ok(row.get("count"))
    }

    /// Enrollments whose product id is null or matches no product.
    pub async fn count_unmatched_enrollments(&self) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count
            FROM enrollments e
            LEFT JOIN products p ON p.product_id = e.product_id
            WHERE p.product_id IS NULL
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to count unmatched enrollments")?;
        Ok(row.get("count"))
    }

    // ========================
    // Joined view
    // ========================

    /// Left join of every enrollment to its product, ordered by enrollment code.
    pub async fn fetch_joined_records(&self) -> Result<Vec<JoinedRecord>> {
        let query = format!("{} ORDER BY e.enrollment_code", JOINED_SELECT);
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch enrollments joined to products")?;

        rows.iter().map(Self::row_to_joined).collect()
    }

    pub async fn fetch_joined_record(&self, code: &str) -> Result<Option<JoinedRecord>> {
        let query = format!("{} WHERE e.enrollment_code = ?", JOINED_SELECT);
        let row = sqlx::query(&query)
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch enrollment joined to product")?;

        row.as_ref().map(Self::row_to_joined).transpose()
    }

    fn row_to_enrollment(row: &sqlx::sqlite::SqliteRow) -> Result<EnrollmentRecord> {
        let enrollment_code: String = row.get("enrollment_code");
        Ok(EnrollmentRecord {
            enrollment_date: parse_date(row.get("enrollment_date"))
                .with_context(|| format!("Invalid enrollment_date for {}", enrollment_code))?,
            amount_cents: row.get("amount_cents"),
            product_id: row.get("product_id"),
            enrollment_code,
        })
    }

    fn row_to_joined(row: &sqlx::sqlite::SqliteRow) -> Result<JoinedRecord> {
        let enrollment = Self::row_to_enrollment(row)?;

        let matched: Option<String> = row.get("matched_product_id");
        let product = match matched {
            Some(product_id) => {
                let modality: Option<String> = row.get("modality");
                Some(ProductRecord {
                    modality: Modality::from_str(modality.as_deref().unwrap_or_default()),
                    start_date: parse_date(row.get("start_date"))
                        .context("Invalid product start_date")?,
                    end_date: parse_date(row.get("end_date"))
                        .context("Invalid product end_date")?,
                    recognition_start: parse_date(row.get("recognition_start"))
                        .context("Invalid recognition_start")?,
                    recognition_end: parse_date(row.get("recognition_end"))
                        .context("Invalid recognition_end")?,
                    duration_months: row.get("duration_months"),
                    product_id,
                })
            }
            None => None,
        };

        Ok(JoinedRecord::new(enrollment, product))
    }
}

fn format_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format(DATE_FORMAT).to_string())
}

fn parse_date(value: Option<String>) -> Result<Option<NaiveDate>> {
    value
        .filter(|s| !s.trim().is_empty())
        .map(|s| NaiveDate::parse_from_str(s.trim(), DATE_FORMAT))
        .transpose()
        .map_err(Into::into)
}
