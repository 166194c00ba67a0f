//! Bank transaction models

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::document::Document;
use crate::pricing::is_storable;

/// A settled incoming transfer, possibly matched to an invoice
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct BankTransaction {
    pub id: Uuid,
    pub external_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub label: Option<String>,
    pub counterparty: Option<String>,
    /// Reference given by the payer, becomes the invoice's payment reference
    pub external_reference: Option<String>,
    pub settled_on: NaiveDate,
    pub associated: bool,
    pub document_id: Option<Uuid>,
    pub associated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A transaction as reported by the bank feed or pushed to the webhook
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct IncomingTransaction {
    pub external_id: String,
    pub amount: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub counterparty: Option<String>,
    #[serde(default)]
    pub external_reference: Option<String>,
    pub settled_on: NaiveDate,
}

impl IncomingTransaction {
    /// Only settled credits with an id and a storable amount are imported
    pub fn is_importable(&self) -> bool {
        !self.external_id.trim().is_empty()
            && self.amount > Decimal::ZERO
            && is_storable(self.amount)
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct SyncRequest {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Serialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub fetched: usize,
    pub imported: usize,
    /// Already known, or not an importable credit
    pub skipped: usize,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct AssociateRequest {
    pub document_id: Uuid,
}

#[derive(Debug, Serialize, Clone)]
pub struct AssociationOutcome {
    pub transaction: BankTransaction,
    pub document: Document,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookPayload {
    pub transactions: Vec<IncomingTransaction>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListTransactionsQuery {
    pub page: Option<i32>,
    pub limit: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_webhook_payload_defaults() {
        let payload: WebhookPayload = serde_json::from_str(
            r#"{"transactions":[{"external_id":"tx-1","amount":"1200.00","settled_on":"2025-03-01"}]}"#,
        )
        .unwrap();
        let tx = &payload.transactions[0];
        assert_eq!(tx.amount, dec!(1200));
        assert!(tx.currency.is_none());
        assert!(tx.is_importable());
    }

    #[test]
    fn test_debits_are_not_importable() {
        let tx = IncomingTransaction {
            external_id: "tx-2".into(),
            amount: dec!(-50),
            currency: None,
            label: None,
            counterparty: None,
            external_reference: None,
            settled_on: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        };
        assert!(!tx.is_importable());
        assert!(!IncomingTransaction {
            external_id: " ".into(),
            amount: dec!(10),
            ..tx
        }
        .is_importable());
    }

    #[test]
    fn test_amounts_beyond_money_columns_are_not_importable() {
        let tx = IncomingTransaction {
            external_id: "tx-3".into(),
            amount: dec!(10000000000),
            currency: None,
            label: None,
            counterparty: None,
            external_reference: None,
            settled_on: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        };
        assert!(!tx.is_importable());
        assert!(!IncomingTransaction {
            amount: dec!(12.005),
            ..tx.clone()
        }
        .is_importable());
        assert!(IncomingTransaction {
            amount: dec!(9999999999.99),
            ..tx
        }
        .is_importable());
    }
}
