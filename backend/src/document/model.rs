//! Commercial document models

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::pricing::{DocumentTotals, LineInput};
use crate::vat::VatRegime;

/// Quote, invoice, credit note or purchase order
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Document {
    pub id: Uuid,
    pub reference: String,
    pub doc_type: DocumentType,
    pub status: DocumentStatus,
    pub collaboration_id: Option<Uuid>,
    pub brand_id: Uuid,
    pub title: String,
    pub vat_regime: VatRegime,
    pub vat_rate: Decimal,
    pub vat_mention: Option<String>,
    pub amount_ht: Decimal,
    pub amount_tva: Decimal,
    pub amount_ttc: Decimal,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub validated_at: Option<DateTime<Utc>>,
    pub payment_date: Option<NaiveDate>,
    pub payment_reference: Option<String>,
    pub payment_method: Option<String>,
    /// Reference of the document this one derives from (quote or replaced invoice)
    pub invoice_ref: Option<String>,
    /// Invoice a credit note applies to
    pub credited_document_id: Option<Uuid>,
    /// Latest credit note issued against this invoice
    pub credit_note_ref: Option<String>,
    pub notes: Option<String>,
    pub pdf_url: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn totals(&self) -> DocumentTotals {
        DocumentTotals {
            amount_ht: self.amount_ht,
            amount_tva: self.amount_tva,
            amount_ttc: self.amount_ttc,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "document_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    Devis,
    Facture,
    Avoir,
    BonDeCommande,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Devis => "DEVIS",
            DocumentType::Facture => "FACTURE",
            DocumentType::Avoir => "AVOIR",
            DocumentType::BonDeCommande => "BON_DE_COMMANDE",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "document_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Brouillon,
    Envoye,
    Valide,
    Refuse,
    Paye,
    Annule,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Brouillon => "BROUILLON",
            DocumentStatus::Envoye => "ENVOYE",
            DocumentStatus::Valide => "VALIDE",
            DocumentStatus::Refuse => "REFUSE",
            DocumentStatus::Paye => "PAYE",
            DocumentStatus::Annule => "ANNULE",
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct DocumentLine {
    pub id: Uuid,
    pub document_id: Uuid,
    pub position: i32,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub vat_rate: Decimal,
    pub total_ht: Decimal,
    pub source_line_id: Option<Uuid>,
}

impl DocumentLine {
    /// Back to calculator input, keeping description, quantity and price
    pub fn to_input(&self) -> LineInput {
        LineInput {
            description: self.description.clone(),
            quantity: self.quantity,
            unit_price: self.unit_price,
            source_line_id: self.source_line_id,
        }
    }
}

/// Audit trail entry
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct DocumentEvent {
    pub id: Uuid,
    pub document_id: Uuid,
    pub kind: String,
    pub actor_id: Option<Uuid>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentEventKind {
    Created,
    Updated,
    Sent,
    Accepted,
    Refused,
    ConvertedToInvoice,
    Payment,
    PaymentReversed,
    CreditNoteIssued,
    Cancelled,
    Replaced,
}

impl DocumentEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentEventKind::Created => "CREATED",
            DocumentEventKind::Updated => "UPDATED",
            DocumentEventKind::Sent => "SENT",
            DocumentEventKind::Accepted => "ACCEPTED",
            DocumentEventKind::Refused => "REFUSED",
            DocumentEventKind::ConvertedToInvoice => "CONVERTED_TO_INVOICE",
            DocumentEventKind::Payment => "PAYMENT",
            DocumentEventKind::PaymentReversed => "PAYMENT_REVERSED",
            DocumentEventKind::CreditNoteIssued => "CREDIT_NOTE_ISSUED",
            DocumentEventKind::Cancelled => "CANCELLED",
            DocumentEventKind::Replaced => "REPLACED",
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct DocumentDetail {
    #[serde(flatten)]
    pub document: Document,
    pub lines: Vec<DocumentLine>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateDocumentRequest {
    pub doc_type: DocumentType,
    pub collaboration_id: Option<Uuid>,
    /// Required when no collaboration is linked
    pub brand_id: Option<Uuid>,
    pub title: Option<String>,
    /// Defaults to the collaboration's deliverables
    pub lines: Option<Vec<LineInput>>,
    /// Overrides the regime resolved from the brand
    pub vat_regime: Option<VatRegime>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Absent fields are left unchanged; lines replace the whole list
#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateDocumentRequest {
    pub title: Option<String>,
    pub lines: Option<Vec<LineInput>>,
    pub vat_regime: Option<VatRegime>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RefuseQuoteRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarkPaidRequest {
    pub payment_date: NaiveDate,
    pub payment_reference: Option<String>,
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReversePaymentRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CreditLineRequest {
    /// Line of the invoice being credited
    pub line_id: Uuid,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreditNoteRequest {
    pub lines: Vec<CreditLineRequest>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReplaceInvoiceRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct CreditNoteOutcome {
    pub credit_note: DocumentDetail,
    pub invoice: Document,
}

/// Credit note, cancelled original and its draft successor
#[derive(Debug, Serialize, Clone)]
pub struct ReplacementOutcome {
    pub credit_note: DocumentDetail,
    pub cancelled_invoice: Document,
    pub replacement: DocumentDetail,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListDocumentsQuery {
    pub doc_type: Option<DocumentType>,
    pub status: Option<DocumentStatus>,
    pub collaboration_id: Option<Uuid>,
    pub brand_id: Option<Uuid>,
    pub page: Option<i32>,
    pub limit: Option<i32>,
}
