//! Collaboration models

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::DealSource;
use crate::pricing::CommissionBreakdown;

/// A won deal
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Collaboration {
    pub id: Uuid,
    pub reference: String,
    pub negotiation_id: Option<Uuid>,
    pub talent_id: Uuid,
    pub brand_id: Uuid,
    pub manager_id: Option<Uuid>,
    pub title: String,
    pub source: DealSource,
    pub status: CollaborationStatus,
    pub gross_amount: Decimal,
    pub commission_percent: Decimal,
    pub commission_amount: Decimal,
    pub net_amount: Decimal,
    pub lost_reason: Option<String>,
    pub publication_date: Option<NaiveDate>,
    pub talent_invoice_url: Option<String>,
    pub talent_invoice_received_at: Option<DateTime<Utc>>,
    pub talent_invoice_validated: bool,
    /// The brand paid the agency
    pub brand_paid_at: Option<DateTime<Utc>>,
    /// The agency paid the talent
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "collaboration_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollaborationStatus {
    Nego,
    Gagne,
    EnCours,
    Publie,
    FactureRecue,
    Paye,
    Perdu,
}

impl CollaborationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollaborationStatus::Nego => "NEGO",
            CollaborationStatus::Gagne => "GAGNE",
            CollaborationStatus::EnCours => "EN_COURS",
            CollaborationStatus::Publie => "PUBLIE",
            CollaborationStatus::FactureRecue => "FACTURE_RECUE",
            CollaborationStatus::Paye => "PAYE",
            CollaborationStatus::Perdu => "PERDU",
        }
    }

    /// Position on the forward path; PERDU is off the path
    pub fn rank(&self) -> Option<u8> {
        match self {
            CollaborationStatus::Nego => Some(0),
            CollaborationStatus::Gagne => Some(1),
            CollaborationStatus::EnCours => Some(2),
            CollaborationStatus::Publie => Some(3),
            CollaborationStatus::FactureRecue => Some(4),
            CollaborationStatus::Paye => Some(5),
            CollaborationStatus::Perdu => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CollaborationStatus::Paye | CollaborationStatus::Perdu)
    }
}

impl std::fmt::Display for CollaborationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct CollaborationDeliverable {
    pub id: Uuid,
    pub collaboration_id: Uuid,
    pub position: i32,
    pub kind: String,
    pub description: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub delivered: bool,
}

impl CollaborationDeliverable {
    /// Label used when the deliverable becomes a document line
    pub fn label(&self) -> String {
        match self.description.as_deref().filter(|d| !d.trim().is_empty()) {
            Some(description) => format!("{} - {}", self.kind, description),
            None => self.kind.clone(),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct CollaborationDetail {
    #[serde(flatten)]
    pub collaboration: Collaboration,
    pub deliverables: Vec<CollaborationDeliverable>,
}

/// Everything needed to insert a collaboration row
#[derive(Debug, Clone)]
pub struct NewCollaboration {
    pub reference: String,
    pub negotiation_id: Option<Uuid>,
    pub talent_id: Uuid,
    pub brand_id: Uuid,
    pub manager_id: Option<Uuid>,
    pub title: String,
    pub source: DealSource,
    pub status: CollaborationStatus,
    pub gross_amount: Decimal,
    pub commission: CommissionBreakdown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCollaborationDeliverable {
    pub kind: String,
    pub description: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct MarkPublishedRequest {
    pub publication_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct TalentInvoiceRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct MarkLostRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAmountRequest {
    pub gross_amount: Decimal,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListCollaborationsQuery {
    pub status: Option<CollaborationStatus>,
    pub talent_id: Option<Uuid>,
    pub brand_id: Option<Uuid>,
    pub manager_id: Option<Uuid>,
    pub page: Option<i32>,
    pub limit: Option<i32>,
}
