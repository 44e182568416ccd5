use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::Cents;

pub type ProductId = String;

/// Delivery mode of a product. Only `ONLINE` changes how dates are resolved;
/// every other label is kept verbatim for the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modality {
    Online,
    Other(String),
}

impl Modality {
    pub fn as_str(&self) -> &str {
        match self {
            Modality::Online => "ONLINE",
            Modality::Other(label) => label,
        }
    }

    pub fn from_str(s: &str) -> Self {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("online") {
            Modality::Online
        } else {
            Modality::Other(trimmed.to_string())
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, Modality::Online)
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single purchase/registration event with an associated fee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    /// Unique per enrollment
    pub enrollment_code: String,
    pub enrollment_date: Option<NaiveDate>,
    pub amount_cents: Cents,
    /// Foreign key into the product catalogue; may point nowhere
    pub product_id: Option<ProductId>,
}

impl EnrollmentRecord {
    pub fn new(enrollment_code: impl Into<String>, amount_cents: Cents) -> Self {
        Self {
            enrollment_code: enrollment_code.into(),
            enrollment_date: None,
            amount_cents,
            product_id: None,
        }
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.enrollment_date = Some(date);
        self
    }

    pub fn with_product(mut self, product_id: impl Into<ProductId>) -> Self {
        self.product_id = Some(product_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub product_id: ProductId,
    pub modality: Modality,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Window over which revenue is recognised for accounting purposes
    pub recognition_start: Option<NaiveDate>,
    pub recognition_end: Option<NaiveDate>,
    pub duration_months: Option<f64>,
}

impl ProductRecord {
    pub fn new(product_id: impl Into<ProductId>, modality: Modality) -> Self {
        Self {
            product_id: product_id.into(),
            modality,
            start_date: None,
            end_date: None,
            recognition_start: None,
            recognition_end: None,
            duration_months: None,
        }
    }

    pub fn with_product_window(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn with_recognition_window(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.recognition_start = Some(start);
        self.recognition_end = Some(end);
        self
    }

    pub fn with_duration_months(mut self, months: f64) -> Self {
        self.duration_months = Some(months);
        self
    }
}

/// An enrollment left-joined to its product. `product` is `None` when the
/// product id is missing or unmatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedRecord {
    pub enrollment: EnrollmentRecord,
    pub product: Option<ProductRecord>,
}

impl JoinedRecord {
    pub fn new(enrollment: EnrollmentRecord, product: Option<ProductRecord>) -> Self {
        Self {
            enrollment,
            product,
        }
    }

    pub fn modality(&self) -> Option<&Modality> {
        self.product.as_ref().map(|p| &p.modality)
    }
}

/// Left join enrollments to products on product id.
/// Produces exactly one record per enrollment, in input order.
pub fn join_records(
    enrollments: Vec<EnrollmentRecord>,
    products: &[ProductRecord],
) -> Vec<JoinedRecord> {
    let catalogue: HashMap<&str, &ProductRecord> = products
        .iter()
        .map(|p| (p.product_id.as_str(), p))
        .collect();

    enrollments
        .into_iter()
        .map(|enrollment| {
            let product = enrollment
                .product_id
                .as_deref()
                .and_then(|id| catalogue.get(id))
                .map(|p| (*p).clone());
            JoinedRecord::new(enrollment, product)
        })
        .collect()
}
