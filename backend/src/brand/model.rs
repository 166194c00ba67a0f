//! Brand models

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

/// Client company and the billing identity documents are issued to
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Brand {
    pub id: Uuid,
    pub name: String,
    pub legal_name: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: String,
    pub vat_number: Option<String>,
    pub payment_terms_days: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Brand {
    /// Name printed on documents
    pub fn billing_name(&self) -> &str {
        self.legal_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.name)
    }

    /// VAT number, blank treated as absent
    pub fn vat_number(&self) -> Option<&str> {
        self.vat_number.as_deref().filter(|v| !v.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBrandRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub legal_name: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    #[validate(length(max = 20))]
    pub vat_number: Option<String>,
    #[validate(range(min = 0, max = 365))]
    pub payment_terms_days: Option<i32>,
}

/// Absent fields are left unchanged
#[derive(Debug, Deserialize, Validate, Default)]
pub struct UpdateBillingRequest {
    pub legal_name: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    #[validate(length(max = 20))]
    pub vat_number: Option<String>,
    #[validate(range(min = 0, max = 365))]
    pub payment_terms_days: Option<i32>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListBrandsQuery {
    pub search: Option<String>,
    pub page: Option<i32>,
    pub limit: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn brand() -> Brand {
        Brand {
            id: Uuid::new_v4(),
            name: "Maison Lumière".into(),
            legal_name: None,
            address: None,
            postal_code: None,
            city: None,
            country: "France".into(),
            vat_number: Some("  ".into()),
            payment_terms_days: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_billing_name_falls_back_to_name() {
        let mut b = brand();
        assert_eq!(b.billing_name(), "Maison Lumière");
        b.legal_name = Some("Maison Lumière SAS".into());
        assert_eq!(b.billing_name(), "Maison Lumière SAS");
    }

    #[test]
    fn test_blank_vat_number_is_absent() {
        let mut b = brand();
        assert_eq!(b.vat_number(), None);
        b.vat_number = Some("DE123456789".into());
        assert_eq!(b.vat_number(), Some("DE123456789"));
    }
}
