//! Notification models

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::UserRole;

/// A stored, user-facing notification
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    NegotiationSubmitted,
    NegotiationValidated,
    NegotiationRefused,
    InvoiceSent,
    QuoteAccepted,
    QuoteRefused,
    InvoicePaid,
    PaymentReversed,
    CreditNoteIssued,
    TalentInvoiceReceived,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::NegotiationSubmitted => "NEGOTIATION_SUBMITTED",
            NotificationKind::NegotiationValidated => "NEGOTIATION_VALIDATED",
            NotificationKind::NegotiationRefused => "NEGOTIATION_REFUSED",
            NotificationKind::InvoiceSent => "INVOICE_SENT",
            NotificationKind::QuoteAccepted => "QUOTE_ACCEPTED",
            NotificationKind::QuoteRefused => "QUOTE_REFUSED",
            NotificationKind::InvoicePaid => "INVOICE_PAID",
            NotificationKind::PaymentReversed => "PAYMENT_REVERSED",
            NotificationKind::CreditNoteIssued => "CREDIT_NOTE_ISSUED",
            NotificationKind::TalentInvoiceReceived => "TALENT_INVOICE_RECEIVED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipients {
    User(Uuid),
    /// Every user holding one of the roles
    Roles(&'static [UserRole]),
}

/// A notification collected during a transition, delivered after commit
#[derive(Debug, Clone, PartialEq)]
pub struct PendingNotification {
    pub recipients: Recipients,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
}

impl PendingNotification {
    pub fn to_user(
        user_id: Uuid,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            recipients: Recipients::User(user_id),
            kind,
            title: title.into(),
            message: message.into(),
            link: None,
        }
    }

    pub fn to_roles(
        roles: &'static [UserRole],
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            recipients: Recipients::Roles(roles),
            kind,
            title: title.into(),
            message: message.into(),
            link: None,
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Materialize for one recipient
    pub fn for_user(&self, user_id: Uuid) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            user_id,
            kind: self.kind.as_str().to_string(),
            title: self.title.clone(),
            message: self.message.clone(),
            link: self.link.clone(),
            read: false,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ListNotificationsQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub page: Option<i32>,
    pub limit: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_user_materializes_unread_copy() {
        let pending = PendingNotification::to_user(
            Uuid::new_v4(),
            NotificationKind::InvoicePaid,
            "Invoice paid",
            "FACTURE-2025-0001 was paid",
        )
        .with_link("/documents/1");

        let user = Uuid::new_v4();
        let n = pending.for_user(user);
        assert_eq!(n.user_id, user);
        assert_eq!(n.kind, "INVOICE_PAID");
        assert_eq!(n.link.as_deref(), Some("/documents/1"));
        assert!(!n.read);
    }

    #[test]
    fn test_kind_serializes_like_stored_value() {
        let json = serde_json::to_string(&NotificationKind::CreditNoteIssued).unwrap();
        assert_eq!(json, "\"CREDIT_NOTE_ISSUED\"");
    }
}
