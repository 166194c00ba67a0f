//! Negotiation models

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::collaboration::CollaborationDetail;
use crate::models::DealSource;

/// A proposed deal. Once `collaboration_id` is set the row is frozen.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Negotiation {
    pub id: Uuid,
    pub reference: String,
    pub talent_id: Uuid,
    pub brand_id: Uuid,
    pub created_by: Uuid,
    pub title: String,
    pub source: DealSource,
    pub status: NegotiationStatus,
    pub brand_budget: Option<Decimal>,
    pub desired_budget: Option<Decimal>,
    pub final_budget: Option<Decimal>,
    pub notes: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub refusal_reason: Option<String>,
    pub collaboration_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "negotiation_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NegotiationStatus {
    Brouillon,
    EnAttente,
    EnDiscussion,
    Validee,
    Refusee,
}

impl NegotiationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NegotiationStatus::Brouillon => "BROUILLON",
            NegotiationStatus::EnAttente => "EN_ATTENTE",
            NegotiationStatus::EnDiscussion => "EN_DISCUSSION",
            NegotiationStatus::Validee => "VALIDEE",
            NegotiationStatus::Refusee => "REFUSEE",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, NegotiationStatus::Validee | NegotiationStatus::Refusee)
    }
}

impl std::fmt::Display for NegotiationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct NegotiationDeliverable {
    pub id: Uuid,
    pub negotiation_id: Uuid,
    pub position: i32,
    pub kind: String,
    pub description: Option<String>,
    pub quantity: i32,
    pub requested_price: Option<Decimal>,
    pub desired_price: Option<Decimal>,
    pub final_price: Option<Decimal>,
}

#[derive(Debug, Serialize, Clone)]
pub struct NegotiationDetail {
    #[serde(flatten)]
    pub negotiation: Negotiation,
    pub deliverables: Vec<NegotiationDeliverable>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DeliverableInput {
    #[validate(length(min = 1, max = 80))]
    pub kind: String,
    pub description: Option<String>,
    #[validate(range(min = 1, max = 10000))]
    pub quantity: i32,
    pub requested_price: Option<Decimal>,
    pub desired_price: Option<Decimal>,
    pub final_price: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateNegotiationRequest {
    pub talent_id: Uuid,
    pub brand_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub source: DealSource,
    pub brand_budget: Option<Decimal>,
    pub desired_budget: Option<Decimal>,
    pub final_budget: Option<Decimal>,
    pub notes: Option<String>,
    #[serde(default)]
    pub deliverables: Vec<DeliverableInput>,
}

/// Absent fields are left unchanged; `deliverables` replaces the whole list.
/// Budgets are tri-state: absent keeps, `null` clears, a value sets.
#[derive(Debug, Clone, Deserialize, Validate, Default)]
pub struct UpdateNegotiationRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    pub source: Option<DealSource>,
    #[serde(default, deserialize_with = "present")]
    pub brand_budget: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "present")]
    pub desired_budget: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "present")]
    pub final_budget: Option<Option<Decimal>>,
    pub notes: Option<String>,
    pub deliverables: Option<Vec<DeliverableInput>>,
}

impl UpdateNegotiationRequest {
    /// Budgets as they will read after the update, `None` where untouched or cleared
    pub fn budget_values(&self) -> [Option<Decimal>; 3] {
        [
            self.brand_budget.flatten(),
            self.desired_budget.flatten(),
            self.final_budget.flatten(),
        ]
    }
}

/// A field that is present, even as `null`, becomes `Some`
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize, Default)]
pub struct RefuseNegotiationRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListNegotiationsQuery {
    pub status: Option<NegotiationStatus>,
    pub talent_id: Option<Uuid>,
    pub brand_id: Option<Uuid>,
    pub page: Option<i32>,
    pub limit: Option<i32>,
}

/// Result of a successful validation
#[derive(Debug, Serialize, Clone)]
pub struct ValidationOutcome {
    pub negotiation: Negotiation,
    pub collaboration: CollaborationDetail,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_budget_update_distinguishes_absent_null_and_value() {
        let request: UpdateNegotiationRequest = serde_json::from_str(
            r#"{"brand_budget": null, "final_budget": "1500.00"}"#,
        )
        .unwrap();

        assert_eq!(request.brand_budget, Some(None));
        assert_eq!(request.desired_budget, None);
        assert_eq!(request.final_budget, Some(Some(dec!(1500))));
        assert_eq!(request.budget_values(), [None, None, Some(dec!(1500))]);
    }

    #[test]
    fn test_empty_update_touches_nothing() {
        let request: UpdateNegotiationRequest = serde_json::from_str("{}").unwrap();
        assert!(request.brand_budget.is_none());
        assert!(request.desired_budget.is_none());
        assert!(request.final_budget.is_none());
        assert!(request.deliverables.is_none());
    }
}
