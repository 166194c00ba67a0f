//! Structured document data and the PDF renderer seam

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use axum::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;

use super::model::{Document, DocumentLine, DocumentStatus, DocumentType};
use crate::brand::Brand;
use crate::pricing::DocumentTotals;
use crate::vat::VatRegime;

/// Who the document is addressed to
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BillingParty {
    pub name: String,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: String,
    pub vat_number: Option<String>,
}

impl From<&Brand> for BillingParty {
    fn from(brand: &Brand) -> Self {
        Self {
            name: brand.billing_name().to_string(),
            address: brand.address.clone(),
            postal_code: brand.postal_code.clone(),
            city: brand.city.clone(),
            country: brand.country.clone(),
            vat_number: brand.vat_number().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RenderLine {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total_ht: Decimal,
}

/// Everything a renderer needs, already computed
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DocumentRenderData {
    pub reference: String,
    pub doc_type: DocumentType,
    pub status: DocumentStatus,
    pub title: String,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub buyer: BillingParty,
    pub lines: Vec<RenderLine>,
    pub vat_regime: VatRegime,
    pub vat_rate: Decimal,
    pub totals: DocumentTotals,
    pub vat_mention: Option<String>,
    /// Quote an invoice came from, or invoice a credit note cancels
    pub related_reference: Option<String>,
    pub notes: Option<String>,
}

pub fn build_render_data(
    document: &Document,
    lines: &[DocumentLine],
    brand: &Brand,
    related_reference: Option<String>,
) -> DocumentRenderData {
    DocumentRenderData {
        reference: document.reference.clone(),
        doc_type: document.doc_type,
        status: document.status,
        title: document.title.clone(),
        issue_date: document.issue_date,
        due_date: document.due_date,
        buyer: BillingParty::from(brand),
        lines: lines
            .iter()
            .map(|line| RenderLine {
                description: line.description.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
                total_ht: line.total_ht,
            })
            .collect(),
        vat_regime: document.vat_regime,
        vat_rate: document.vat_rate,
        totals: document.totals(),
        vat_mention: document.vat_mention.clone(),
        related_reference: related_reference.or_else(|| document.invoice_ref.clone()),
        notes: document.notes.clone(),
    }
}

#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub extension: &'static str,
}

#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render(&self, data: &DocumentRenderData) -> Result<RenderedDocument>;
}

/// Posts the render data to an external rendering service
pub struct HttpPdfRenderer {
    url: String,
    client: Client,
}

impl HttpPdfRenderer {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }
}

#[async_trait]
impl PdfRenderer for HttpPdfRenderer {
    async fn render(&self, data: &DocumentRenderData) -> Result<RenderedDocument> {
        let response = self
            .client
            .post(&self.url)
            .json(data)
            .send()
            .await
            .context("PDF renderer unreachable")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("PDF renderer returned {} for {}", status, data.reference));
        }

        let bytes = response.bytes().await?.to_vec();
        if bytes.is_empty() {
            return Err(anyhow!("PDF renderer returned an empty body for {}", data.reference));
        }

        Ok(RenderedDocument {
            bytes,
            content_type: "application/pdf".to_string(),
            extension: "pdf",
        })
    }
}

/// Stores the structured data itself when no renderer is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSnapshotRenderer;

#[async_trait]
impl PdfRenderer for JsonSnapshotRenderer {
    async fn render(&self, data: &DocumentRenderData) -> Result<RenderedDocument> {
        Ok(RenderedDocument {
            bytes: serde_json::to_vec_pretty(data)?,
            content_type: "application/json".to_string(),
            extension: "json",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn brand() -> Brand {
        Brand {
            id: Uuid::new_v4(),
            name: "Acme".into(),
            legal_name: Some("Acme GmbH".into()),
            address: Some("Hauptstrasse 1".into()),
            postal_code: Some("10115".into()),
            city: Some("Berlin".into()),
            country: "Allemagne".into(),
            vat_number: Some("DE123456789".into()),
            payment_terms_days: Some(45),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn invoice(brand: &Brand) -> Document {
        Document {
            id: Uuid::new_v4(),
            reference: "FACTURE-2025-0007".into(),
            doc_type: DocumentType::Facture,
            status: DocumentStatus::Brouillon,
            collaboration_id: None,
            brand_id: brand.id,
            title: "Spring campaign".into(),
            vat_regime: VatRegime::EuIntracom,
            vat_rate: dec!(0),
            vat_mention: Some(crate::vat::REVERSE_CHARGE_MENTION.to_string()),
            amount_ht: dec!(1000),
            amount_tva: dec!(0),
            amount_ttc: dec!(1000),
            issue_date: None,
            due_date: None,
            validated_at: None,
            payment_date: None,
            payment_reference: None,
            payment_method: None,
            invoice_ref: Some("DEVIS-2025-0003".into()),
            credited_document_id: None,
            credit_note_ref: None,
            notes: None,
            pdf_url: None,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_render_data_carries_party_and_mention() {
        let brand = brand();
        let document = invoice(&brand);
        let data = build_render_data(&document, &[], &brand, None);

        assert_eq!(data.buyer.name, "Acme GmbH");
        assert_eq!(data.buyer.vat_number.as_deref(), Some("DE123456789"));
        assert_eq!(data.totals.amount_ttc, dec!(1000));
        assert!(data.vat_mention.is_some());
        assert_eq!(data.related_reference.as_deref(), Some("DEVIS-2025-0003"));
    }

    #[tokio::test]
    async fn test_snapshot_renderer_outputs_json() {
        let brand = brand();
        let data = build_render_data(&invoice(&brand), &[], &brand, None);
        let rendered = JsonSnapshotRenderer.render(&data).await.unwrap();

        assert_eq!(rendered.extension, "json");
        let parsed: serde_json::Value = serde_json::from_slice(&rendered.bytes).unwrap();
        assert_eq!(parsed["reference"], "FACTURE-2025-0007");
        assert_eq!(parsed["doc_type"], "FACTURE");
    }
}
