//! Talent models

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

/// A represented person. Commission rates are percentages and only affect
/// deals computed after an edit.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Talent {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub commission_inbound: Decimal,
    pub commission_outbound: Decimal,
    pub manager_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Talent {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTalentRequest {
    #[validate(length(min = 1, max = 120))]
    pub first_name: String,
    #[validate(length(min = 1, max = 120))]
    pub last_name: String,
    #[validate(email)]
    pub email: Option<String>,
    pub commission_inbound: Decimal,
    pub commission_outbound: Decimal,
    pub manager_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCommissionRequest {
    pub commission_inbound: Option<Decimal>,
    pub commission_outbound: Option<Decimal>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListTalentsQuery {
    pub manager_id: Option<Uuid>,
    pub page: Option<i32>,
    pub limit: Option<i32>,
}
