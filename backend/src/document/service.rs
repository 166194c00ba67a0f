//! Document service - quotes, invoices, credit notes and purchase orders

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::credit::{self, CreditPlan};
use super::model::{
    CreditNoteOutcome, CreditNoteRequest, Document, DocumentDetail, DocumentEvent,
    DocumentEventKind, DocumentLine, DocumentStatus, DocumentType, GenerateDocumentRequest,
    ListDocumentsQuery, MarkPaidRequest, RefuseQuoteRequest, ReplaceInvoiceRequest,
    ReplacementOutcome, ReversePaymentRequest, UpdateDocumentRequest,
};
use super::render::{build_render_data, DocumentRenderData, PdfRenderer};
use super::rules;
use super::store::{self, NewDocument, Payment};
use crate::auth::{authorize, Action, Actor};
use crate::brand::Brand;
use crate::collaboration::{store as collaboration_store, CollaborationStatus};
use crate::error::{ApiError, ApiResult};
use crate::models::{PaginatedResponse, PaginationParams};
use crate::notification::{NotificationKind, Notifier, PendingNotification};
use crate::pricing::{compute_document, ComputedDocument, ComputedLine, LineInput};
use crate::reference::{ReferenceFamily, ReferenceGenerator};
use crate::storage::FileStore;
use crate::vat::{self, VatRegime, VatResolution};

#[derive(Clone)]
pub struct DocumentService {
    db_pool: PgPool,
    references: ReferenceGenerator,
    notifier: Notifier,
    renderer: Arc<dyn PdfRenderer>,
    files: Arc<dyn FileStore>,
    default_payment_terms_days: i64,
}

impl DocumentService {
    pub fn new(
        db_pool: PgPool,
        references: ReferenceGenerator,
        notifier: Notifier,
        renderer: Arc<dyn PdfRenderer>,
        files: Arc<dyn FileStore>,
        default_payment_terms_days: i64,
    ) -> Self {
        Self {
            db_pool,
            references,
            notifier,
            renderer,
            files,
            default_payment_terms_days,
        }
    }

    pub async fn get(&self, id: Uuid) -> ApiResult<DocumentDetail> {
        let mut conn = self.db_pool.acquire().await?;
        let document = store::fetch_document(&mut conn, id).await?;
        let lines = store::fetch_lines(&mut conn, id).await?;
        Ok(DocumentDetail { document, lines })
    }

    pub async fn list(&self, query: ListDocumentsQuery) -> ApiResult<PaginatedResponse<Document>> {
        let (page, limit, offset) = PaginationParams {
            page: query.page,
            limit: query.limit,
        }
        .resolve();

        let mut query_builder = sqlx::QueryBuilder::new("SELECT * FROM documents WHERE 1=1");
        let mut count_builder = sqlx::QueryBuilder::new("SELECT COUNT(*) FROM documents WHERE 1=1");

        if let Some(doc_type) = query.doc_type {
            query_builder.push(" AND doc_type = ");
            query_builder.push_bind(doc_type);
            count_builder.push(" AND doc_type = ");
            count_builder.push_bind(doc_type);
        }
        if let Some(status) = query.status {
            query_builder.push(" AND status = ");
            query_builder.push_bind(status);
            count_builder.push(" AND status = ");
            count_builder.push_bind(status);
        }
        if let Some(collaboration_id) = query.collaboration_id {
            query_builder.push(" AND collaboration_id = ");
            query_builder.push_bind(collaboration_id);
            count_builder.push(" AND collaboration_id = ");
            count_builder.push_bind(collaboration_id);
        }
        if let Some(brand_id) = query.brand_id {
            query_builder.push(" AND brand_id = ");
            query_builder.push_bind(brand_id);
            count_builder.push(" AND brand_id = ");
            count_builder.push_bind(brand_id);
        }

        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.db_pool)
            .await?;

        query_builder.push(" ORDER BY created_at DESC LIMIT ");
        query_builder.push_bind(limit as i64);
        query_builder.push(" OFFSET ");
        query_builder.push_bind(offset);

        let data = query_builder
            .build_query_as::<Document>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(PaginatedResponse {
            data,
            total,
            page,
            limit,
        })
    }

    /// Audit trail, oldest first
    pub async fn events(&self, id: Uuid) -> ApiResult<Vec<DocumentEvent>> {
        let mut conn = self.db_pool.acquire().await?;
        store::fetch_document(&mut conn, id).await?;
        let events = sqlx::query_as::<_, DocumentEvent>(
            "SELECT * FROM document_events WHERE document_id = $1 ORDER BY created_at, id",
        )
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(events)
    }

    /// Every credit note issued against an invoice
    pub async fn credit_notes(&self, invoice_id: Uuid) -> ApiResult<Vec<Document>> {
        let mut conn = self.db_pool.acquire().await?;
        store::fetch_document(&mut conn, invoice_id).await?;
        fetch_credit_notes(&mut conn, invoice_id).await
    }

    pub async fn render_data(&self, id: Uuid) -> ApiResult<DocumentRenderData> {
        let mut conn = self.db_pool.acquire().await?;
        let document = store::fetch_document(&mut conn, id).await?;
        let lines = store::fetch_lines(&mut conn, id).await?;
        let brand = fetch_brand(&mut conn, document.brand_id).await?;
        Ok(build_render_data(&document, &lines, &brand, None))
    }

    /// Draft a quote, invoice or purchase order
    pub async fn generate(
        &self,
        actor: &Actor,
        request: GenerateDocumentRequest,
    ) -> ApiResult<DocumentDetail> {
        authorize(actor, Action::CreateDocument)?;
        if request.doc_type == DocumentType::Avoir {
            return Err(ApiError::validation(
                "doc_type",
                "Credit notes are issued from an invoice",
            ));
        }
        if let Some(lines) = &request.lines {
            rules::validate_lines(lines)?;
        }

        let this = self;
        self.references
            .with_retry("generate_document", move || {
                this.try_generate(actor, request.clone())
            })
            .await
    }

    async fn try_generate(
        &self,
        actor: &Actor,
        request: GenerateDocumentRequest,
    ) -> ApiResult<DocumentDetail> {
        let mut tx = self.db_pool.begin().await?;

        let (brand_id, title, lines) = match request.collaboration_id {
            Some(collaboration_id) => {
                let collaboration =
                    collaboration_store::lock_collaboration(&mut tx, collaboration_id).await?;
                if collaboration.status == CollaborationStatus::Perdu {
                    return Err(ApiError::state_conflict(
                        format!("{} is lost", collaboration.reference),
                        collaboration.status,
                    ));
                }
                if let Some(brand_id) = request.brand_id {
                    if brand_id != collaboration.brand_id {
                        return Err(ApiError::validation(
                            "brand_id",
                            "Brand differs from the collaboration's brand",
                        ));
                    }
                }
                if request.doc_type == DocumentType::Facture {
                    ensure_no_active_invoice(&mut tx, collaboration_id).await?;
                }

                let lines = match request.lines {
                    Some(lines) => lines,
                    None => collaboration_store::fetch_deliverables(&mut tx, collaboration_id)
                        .await?
                        .iter()
                        .map(|d| LineInput::new(d.label(), Decimal::from(d.quantity), d.unit_price))
                        .collect(),
                };
                let title = request.title.unwrap_or(collaboration.title);
                (collaboration.brand_id, title, lines)
            }
            None => {
                let brand_id = request.brand_id.ok_or_else(|| {
                    ApiError::validation("brand_id", "A brand is required without a collaboration")
                })?;
                let title = request
                    .title
                    .ok_or_else(|| ApiError::validation("title", "Title is required"))?;
                (brand_id, title, request.lines.unwrap_or_default())
            }
        };

        if title.trim().is_empty() {
            return Err(ApiError::validation("title", "Title is required"));
        }
        rules::validate_lines(&lines)?;

        let brand = fetch_brand(&mut tx, brand_id).await?;
        let vat = resolve_vat(&brand, request.vat_regime);
        let computed = compute_document(&lines, vat.rate);

        let reference = self
            .references
            .next_for_current_year(ReferenceFamily::for_document(request.doc_type))
            .await?;

        let document = store::insert_document(
            &mut tx,
            &NewDocument {
                reference: &reference,
                doc_type: request.doc_type,
                status: DocumentStatus::Brouillon,
                collaboration_id: request.collaboration_id,
                brand_id,
                title: title.trim(),
                vat: &vat,
                computed: &computed,
                issue_date: request.issue_date,
                due_date: request.due_date,
                invoice_ref: None,
                credited_document_id: None,
                notes: request.notes.as_deref(),
                created_by: actor.user_id,
            },
        )
        .await?;
        let lines = store::insert_lines(&mut tx, document.id, &computed.lines).await?;
        store::record_event(
            &mut tx,
            document.id,
            DocumentEventKind::Created,
            Some(actor.user_id),
            serde_json::json!({
                "vat_regime": vat.regime,
                "amount_ttc": document.amount_ttc,
            }),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            reference = %document.reference,
            doc_type = %document.doc_type,
            vat_regime = %document.vat_regime,
            amount_ttc = %document.amount_ttc,
            actor = %actor.user_id,
            "Document generated"
        );
        Ok(DocumentDetail { document, lines })
    }

    /// Edit a document that is not finalized. VAT and every total are
    /// recomputed from the lines.
    pub async fn update(
        &self,
        actor: &Actor,
        id: Uuid,
        request: UpdateDocumentRequest,
    ) -> ApiResult<DocumentDetail> {
        authorize(actor, Action::EditDocument)?;
        if let Some(lines) = &request.lines {
            rules::validate_lines(lines)?;
        }
        if matches!(&request.title, Some(title) if title.trim().is_empty()) {
            return Err(ApiError::validation("title", "Title cannot be empty"));
        }

        let mut tx = self.db_pool.begin().await?;
        let current = store::lock_document(&mut tx, id).await?;
        let credit_notes = fetch_credit_notes(&mut tx, id).await?;
        rules::ensure_can_edit(&current, credit_notes.len())?;

        let brand = fetch_brand(&mut tx, current.brand_id).await?;
        let vat = resolve_vat(&brand, request.vat_regime);
        let lines_changed = request.lines.is_some();
        let lines = match request.lines {
            Some(lines) => lines,
            None => store::fetch_lines(&mut tx, id)
                .await?
                .iter()
                .map(DocumentLine::to_input)
                .collect(),
        };
        let computed = compute_document(&lines, vat.rate);

        let updated = sqlx::query_as::<_, Document>(
            r#"
            UPDATE documents
            SET title = COALESCE($3, title),
                vat_regime = $4,
                vat_rate = $5,
                vat_mention = $6,
                amount_ht = $7,
                amount_tva = $8,
                amount_ttc = $9,
                issue_date = COALESCE($10, issue_date),
                due_date = COALESCE($11, due_date),
                notes = COALESCE($12, notes),
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(current.status)
        .bind(request.title.as_deref().map(str::trim))
        .bind(vat.regime)
        .bind(vat.rate)
        .bind(vat.legal_mention.as_deref())
        .bind(computed.totals.amount_ht)
        .bind(computed.totals.amount_tva)
        .bind(computed.totals.amount_ttc)
        .bind(request.issue_date)
        .bind(request.due_date)
        .bind(request.notes.as_deref())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| store::concurrent_change(&current))?;

        let lines = store::replace_lines(&mut tx, id, &computed.lines).await?;
        store::record_event(
            &mut tx,
            id,
            DocumentEventKind::Updated,
            Some(actor.user_id),
            serde_json::json!({
                "lines_changed": lines_changed,
                "vat_regime": vat.regime,
                "amount_ttc_before": current.amount_ttc,
                "amount_ttc": updated.amount_ttc,
            }),
        )
        .await?;

        tx.commit().await?;
        tracing::info!(
            reference = %updated.reference,
            amount_ttc = %updated.amount_ttc,
            actor = %actor.user_id,
            "Document updated"
        );
        Ok(DocumentDetail {
            document: updated,
            lines,
        })
    }

    /// BROUILLON -> ENVOYE. Stamps the issue date, derives the due date of
    /// invoices and renders the document before committing.
    pub async fn send(&self, actor: &Actor, id: Uuid) -> ApiResult<Document> {
        authorize(actor, Action::SendDocument)?;

        let mut tx = self.db_pool.begin().await?;
        let current = store::lock_document(&mut tx, id).await?;
        rules::ensure_can_send(&current)?;

        let brand = fetch_brand(&mut tx, current.brand_id).await?;
        let issue_date = current.issue_date.unwrap_or_else(today);
        let due_date = match (current.due_date, current.doc_type) {
            (Some(due), _) => Some(due),
            (None, DocumentType::Facture) => {
                let terms = brand
                    .payment_terms_days
                    .map(i64::from)
                    .unwrap_or(self.default_payment_terms_days);
                Some(rules::due_date(issue_date, terms))
            }
            (None, _) => None,
        };

        let sent = sqlx::query_as::<_, Document>(
            r#"
            UPDATE documents
            SET status = 'ENVOYE', issue_date = $3, due_date = $4, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(current.status)
        .bind(issue_date)
        .bind(due_date)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| store::concurrent_change(&current))?;

        let lines = store::fetch_lines(&mut tx, id).await?;
        let sent = self.render_and_store(&mut tx, &sent, &lines, &brand).await?;
        store::record_event(
            &mut tx,
            id,
            DocumentEventKind::Sent,
            Some(actor.user_id),
            serde_json::json!({ "issue_date": issue_date, "due_date": due_date }),
        )
        .await?;

        let manager = if sent.doc_type == DocumentType::Facture {
            collaboration_manager(&mut tx, sent.collaboration_id).await?
        } else {
            None
        };

        tx.commit().await?;
        log_transition(actor, &current, &sent);

        if let Some(manager_id) = manager {
            self.notifier.dispatch_detached(vec![PendingNotification::to_user(
                manager_id,
                NotificationKind::InvoiceSent,
                "Invoice sent",
                format!("{} was sent to {}", sent.reference, brand.billing_name()),
            )
            .with_link(document_link(&sent))]);
        }
        Ok(sent)
    }

    /// ENVOYE -> VALIDE for quotes; the collaboration moves up to GAGNE
    pub async fn accept(&self, actor: &Actor, id: Uuid) -> ApiResult<Document> {
        authorize(actor, Action::AcceptQuote)?;

        let mut tx = self.db_pool.begin().await?;
        let current = store::lock_document(&mut tx, id).await?;
        rules::ensure_can_accept(&current)?;

        let accepted = sqlx::query_as::<_, Document>(
            r#"
            UPDATE documents
            SET status = 'VALIDE', validated_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(current.status)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| store::concurrent_change(&current))?;

        store::record_event(
            &mut tx,
            id,
            DocumentEventKind::Accepted,
            Some(actor.user_id),
            serde_json::json!({}),
        )
        .await?;

        let mut manager = None;
        if let Some(collaboration_id) = accepted.collaboration_id {
            collaboration_store::advance(&mut tx, collaboration_id, CollaborationStatus::Gagne)
                .await?;
            manager = collaboration_manager(&mut tx, Some(collaboration_id)).await?;
        }

        tx.commit().await?;
        log_transition(actor, &current, &accepted);

        if let Some(manager_id) = manager {
            self.notifier.dispatch_detached(vec![PendingNotification::to_user(
                manager_id,
                NotificationKind::QuoteAccepted,
                "Quote accepted",
                format!("{} was accepted", accepted.reference),
            )
            .with_link(document_link(&accepted))]);
        }
        Ok(accepted)
    }

    /// ENVOYE -> REFUSE for quotes; the reason is appended to the notes and
    /// the collaboration is lost unless already closed
    pub async fn refuse(
        &self,
        actor: &Actor,
        id: Uuid,
        request: RefuseQuoteRequest,
    ) -> ApiResult<Document> {
        authorize(actor, Action::RefuseQuote)?;
        let reason = request
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        let mut tx = self.db_pool.begin().await?;
        let current = store::lock_document(&mut tx, id).await?;
        rules::ensure_can_refuse(&current)?;

        let notes = append_note(current.notes.as_deref(), reason.as_deref().map(|r| format!("Refused: {}", r)));
        let refused = sqlx::query_as::<_, Document>(
            r#"
            UPDATE documents
            SET status = 'REFUSE', notes = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(current.status)
        .bind(notes)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| store::concurrent_change(&current))?;

        store::record_event(
            &mut tx,
            id,
            DocumentEventKind::Refused,
            Some(actor.user_id),
            serde_json::json!({ "reason": reason }),
        )
        .await?;

        let mut manager = None;
        if let Some(collaboration_id) = refused.collaboration_id {
            let lost_reason = reason
                .clone()
                .unwrap_or_else(|| format!("Quote {} refused", refused.reference));
            collaboration_store::mark_lost(&mut tx, collaboration_id, &lost_reason).await?;
            manager = collaboration_manager(&mut tx, Some(collaboration_id)).await?;
        }

        tx.commit().await?;
        log_transition(actor, &current, &refused);

        if let Some(manager_id) = manager {
            self.notifier.dispatch_detached(vec![PendingNotification::to_user(
                manager_id,
                NotificationKind::QuoteRefused,
                "Quote refused",
                format!("{} was refused", refused.reference),
            )
            .with_link(document_link(&refused))]);
        }
        Ok(refused)
    }

    /// Copy an accepted quote into a draft invoice
    pub async fn convert_to_invoice(&self, actor: &Actor, id: Uuid) -> ApiResult<DocumentDetail> {
        authorize(actor, Action::ConvertQuote)?;

        let this = self;
        self.references
            .with_retry("convert_quote", move || this.try_convert(actor, id))
            .await
    }

    async fn try_convert(&self, actor: &Actor, id: Uuid) -> ApiResult<DocumentDetail> {
        let mut tx = self.db_pool.begin().await?;
        let quote = store::lock_document(&mut tx, id).await?;
        rules::ensure_can_convert(&quote)?;

        let (already_converted,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM documents
                WHERE invoice_ref = $1 AND doc_type = 'FACTURE' AND status <> 'ANNULE'
            )
            "#,
        )
        .bind(&quote.reference)
        .fetch_one(&mut *tx)
        .await?;
        if already_converted {
            return Err(ApiError::state_conflict(
                format!("{} was already converted to an invoice", quote.reference),
                quote.status,
            ));
        }
        if let Some(collaboration_id) = quote.collaboration_id {
            collaboration_store::lock_collaboration(&mut tx, collaboration_id).await?;
            ensure_no_active_invoice(&mut tx, collaboration_id).await?;
        }

        let quote_lines = store::fetch_lines(&mut tx, id).await?;
        let computed = ComputedDocument {
            lines: quote_lines.iter().map(copy_line).collect(),
            totals: quote.totals(),
        };
        let vat = VatResolution {
            regime: quote.vat_regime,
            rate: quote.vat_rate,
            legal_mention: quote.vat_mention.clone(),
        };

        let reference = self
            .references
            .next_for_current_year(ReferenceFamily::Invoice)
            .await?;
        let invoice = store::insert_document(
            &mut tx,
            &NewDocument {
                reference: &reference,
                doc_type: DocumentType::Facture,
                status: DocumentStatus::Brouillon,
                collaboration_id: quote.collaboration_id,
                brand_id: quote.brand_id,
                title: &quote.title,
                vat: &vat,
                computed: &computed,
                issue_date: None,
                due_date: None,
                invoice_ref: Some(&quote.reference),
                credited_document_id: None,
                notes: quote.notes.as_deref(),
                created_by: actor.user_id,
            },
        )
        .await?;
        let lines = store::insert_lines(&mut tx, invoice.id, &computed.lines).await?;

        store::record_event(
            &mut tx,
            quote.id,
            DocumentEventKind::ConvertedToInvoice,
            Some(actor.user_id),
            serde_json::json!({ "invoice": invoice.reference }),
        )
        .await?;
        store::record_event(
            &mut tx,
            invoice.id,
            DocumentEventKind::Created,
            Some(actor.user_id),
            serde_json::json!({ "from_quote": quote.reference }),
        )
        .await?;

        if let Some(collaboration_id) = quote.collaboration_id {
            collaboration_store::advance(&mut tx, collaboration_id, CollaborationStatus::EnCours)
                .await?;
        }

        tx.commit().await?;
        tracing::info!(
            quote = %quote.reference,
            invoice = %invoice.reference,
            actor = %actor.user_id,
            "Quote converted to invoice"
        );
        Ok(DocumentDetail {
            document: invoice,
            lines,
        })
    }

    pub async fn mark_paid(
        &self,
        actor: &Actor,
        id: Uuid,
        request: MarkPaidRequest,
    ) -> ApiResult<Document> {
        authorize(actor, Action::MarkDocumentPaid)?;

        let mut tx = self.db_pool.begin().await?;
        let current = store::lock_document(&mut tx, id).await?;
        let payment = Payment {
            date: request.payment_date,
            reference: request.payment_reference,
            method: request.payment_method,
            source: "manual".to_string(),
        };
        let paid = store::apply_payment(&mut tx, &current, &payment, Some(actor)).await?;
        let manager = collaboration_manager(&mut tx, paid.collaboration_id).await?;
        tx.commit().await?;

        if let Some(manager_id) = manager {
            self.notifier.dispatch_detached(vec![invoice_paid_notification(manager_id, &paid)]);
        }
        Ok(paid)
    }

    /// PAYE -> ENVOYE. Clears the payment, the collaboration's brand
    /// payment and any bank transaction matched to the invoice.
    pub async fn reverse_payment(
        &self,
        actor: &Actor,
        id: Uuid,
        request: ReversePaymentRequest,
    ) -> ApiResult<Document> {
        authorize(actor, Action::ReversePayment)?;

        let mut tx = self.db_pool.begin().await?;
        let current = store::lock_document(&mut tx, id).await?;
        rules::ensure_can_reverse_payment(&current)?;

        let reversed = sqlx::query_as::<_, Document>(
            r#"
            UPDATE documents
            SET status = 'ENVOYE',
                payment_date = NULL,
                payment_reference = NULL,
                payment_method = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'PAYE'
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| store::concurrent_change(&current))?;

        let released = sqlx::query(
            r#"
            UPDATE bank_transactions
            SET associated = FALSE, document_id = NULL, associated_at = NULL
            WHERE document_id = $1
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if let Some(collaboration_id) = reversed.collaboration_id {
            collaboration_store::set_brand_paid(&mut tx, collaboration_id, None).await?;
        }

        store::record_event(
            &mut tx,
            id,
            DocumentEventKind::PaymentReversed,
            Some(actor.user_id),
            serde_json::json!({
                "reason": request.reason,
                "payment_date": current.payment_date,
                "payment_reference": current.payment_reference,
                "released_transactions": released,
            }),
        )
        .await?;
        let manager = collaboration_manager(&mut tx, reversed.collaboration_id).await?;

        tx.commit().await?;
        log_transition(actor, &current, &reversed);

        if let Some(manager_id) = manager {
            self.notifier.dispatch_detached(vec![PendingNotification::to_user(
                manager_id,
                NotificationKind::PaymentReversed,
                "Payment reversed",
                format!("The payment of {} was reversed", reversed.reference),
            )
            .with_link(document_link(&reversed))]);
        }
        Ok(reversed)
    }

    /// Credit selected quantities of an invoice. The invoice is cancelled
    /// once nothing is left to credit.
    pub async fn issue_credit_note(
        &self,
        actor: &Actor,
        invoice_id: Uuid,
        request: CreditNoteRequest,
    ) -> ApiResult<CreditNoteOutcome> {
        authorize(actor, Action::IssueCreditNote)?;

        let this = self;
        let outcome = self
            .references
            .with_retry("issue_credit_note", move || {
                this.try_issue_credit_note(actor, invoice_id, request.clone())
            })
            .await?;

        self.notify_credit_note(&outcome.invoice, &outcome.credit_note.document)
            .await;
        Ok(outcome)
    }

    async fn try_issue_credit_note(
        &self,
        actor: &Actor,
        invoice_id: Uuid,
        request: CreditNoteRequest,
    ) -> ApiResult<CreditNoteOutcome> {
        let mut tx = self.db_pool.begin().await?;
        let invoice = store::lock_document(&mut tx, invoice_id).await?;
        rules::ensure_can_credit(&invoice)?;

        let existing = fetch_credit_notes(&mut tx, invoice.id).await?;
        let credited_ttc: Vec<Decimal> = existing.iter().map(|n| n.amount_ttc).collect();
        let remaining = credit::remaining_amount(&invoice, &credited_ttc);
        let already_credited = credited_quantities(&mut tx, invoice.id).await?;
        let invoice_lines = store::fetch_lines(&mut tx, invoice.id).await?;

        let plan = credit::plan_partial_credit(
            &invoice,
            &invoice_lines,
            &already_credited,
            remaining,
            &request.lines,
        )?;

        let credit_note = self
            .insert_credit_note(&mut tx, actor, &invoice, &plan, request.reason.as_deref())
            .await?;
        let invoice = self
            .attach_credit_note(&mut tx, actor, &invoice, &credit_note.document, plan.cancels_invoice)
            .await?;

        tx.commit().await?;
        tracing::info!(
            invoice = %invoice.reference,
            credit_note = %credit_note.document.reference,
            amount_ttc = %credit_note.document.amount_ttc,
            invoice_status = %invoice.status,
            actor = %actor.user_id,
            "Credit note issued"
        );
        Ok(CreditNoteOutcome {
            credit_note,
            invoice,
        })
    }

    /// Credit the whole invoice, cancel it and open a draft copy to correct
    /// and resend, in one transaction
    pub async fn replace_invoice(
        &self,
        actor: &Actor,
        invoice_id: Uuid,
        request: ReplaceInvoiceRequest,
    ) -> ApiResult<ReplacementOutcome> {
        authorize(actor, Action::IssueCreditNote)?;

        let this = self;
        let outcome = self
            .references
            .with_retry("replace_invoice", move || {
                this.try_replace(actor, invoice_id, request.clone())
            })
            .await?;

        self.notify_credit_note(&outcome.cancelled_invoice, &outcome.credit_note.document)
            .await;
        Ok(outcome)
    }

    async fn try_replace(
        &self,
        actor: &Actor,
        invoice_id: Uuid,
        request: ReplaceInvoiceRequest,
    ) -> ApiResult<ReplacementOutcome> {
        let mut tx = self.db_pool.begin().await?;
        let invoice = store::lock_document(&mut tx, invoice_id).await?;
        let existing = fetch_credit_notes(&mut tx, invoice.id).await?;
        rules::ensure_can_replace(&invoice, existing.len())?;

        let invoice_lines = store::fetch_lines(&mut tx, invoice.id).await?;
        let plan = credit::plan_full_credit(&invoice, &invoice_lines);

        let credit_note = self
            .insert_credit_note(&mut tx, actor, &invoice, &plan, request.reason.as_deref())
            .await?;
        // Cancel before the successor exists: one live invoice per collaboration
        let cancelled = self
            .attach_credit_note(&mut tx, actor, &invoice, &credit_note.document, true)
            .await?;

        let copy = compute_document(&credit::replacement_lines(&invoice_lines), invoice.vat_rate);
        let vat = VatResolution {
            regime: invoice.vat_regime,
            rate: invoice.vat_rate,
            legal_mention: invoice.vat_mention.clone(),
        };
        let reference = self
            .references
            .next_for_current_year(ReferenceFamily::Invoice)
            .await?;
        let replacement = store::insert_document(
            &mut tx,
            &NewDocument {
                reference: &reference,
                doc_type: DocumentType::Facture,
                status: DocumentStatus::Brouillon,
                collaboration_id: invoice.collaboration_id,
                brand_id: invoice.brand_id,
                title: &invoice.title,
                vat: &vat,
                computed: &copy,
                issue_date: None,
                due_date: None,
                invoice_ref: Some(&invoice.reference),
                credited_document_id: None,
                notes: invoice.notes.as_deref(),
                created_by: actor.user_id,
            },
        )
        .await?;
        let replacement_lines = store::insert_lines(&mut tx, replacement.id, &copy.lines).await?;

        store::record_event(
            &mut tx,
            replacement.id,
            DocumentEventKind::Created,
            Some(actor.user_id),
            serde_json::json!({ "replaces": invoice.reference }),
        )
        .await?;
        store::record_event(
            &mut tx,
            invoice.id,
            DocumentEventKind::Replaced,
            Some(actor.user_id),
            serde_json::json!({ "replacement": replacement.reference }),
        )
        .await?;

        tx.commit().await?;
        tracing::info!(
            invoice = %invoice.reference,
            credit_note = %credit_note.document.reference,
            replacement = %replacement.reference,
            actor = %actor.user_id,
            "Invoice replaced"
        );
        Ok(ReplacementOutcome {
            credit_note,
            cancelled_invoice: cancelled,
            replacement: DocumentDetail {
                document: replacement,
                lines: replacement_lines,
            },
        })
    }

    /// Insert a credit note born ENVOYE, rendered before the caller commits
    async fn insert_credit_note(
        &self,
        conn: &mut PgConnection,
        actor: &Actor,
        invoice: &Document,
        plan: &CreditPlan,
        reason: Option<&str>,
    ) -> ApiResult<DocumentDetail> {
        let reference = self
            .references
            .next_for_current_year(ReferenceFamily::CreditNote)
            .await?;
        let vat = VatResolution {
            regime: invoice.vat_regime,
            rate: invoice.vat_rate,
            legal_mention: invoice.vat_mention.clone(),
        };
        let title = format!("Credit note on {}", invoice.reference);
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());

        let document = store::insert_document(
            conn,
            &NewDocument {
                reference: &reference,
                doc_type: DocumentType::Avoir,
                status: DocumentStatus::Envoye,
                collaboration_id: invoice.collaboration_id,
                brand_id: invoice.brand_id,
                title: &title,
                vat: &vat,
                computed: &plan.computed,
                issue_date: Some(today()),
                due_date: None,
                invoice_ref: Some(&invoice.reference),
                credited_document_id: Some(invoice.id),
                notes: reason,
                created_by: actor.user_id,
            },
        )
        .await?;
        let lines = store::insert_lines(conn, document.id, &plan.computed.lines).await?;

        let brand = fetch_brand(conn, invoice.brand_id).await?;
        let document = self.render_and_store(conn, &document, &lines, &brand).await?;
        store::record_event(
            conn,
            document.id,
            DocumentEventKind::Created,
            Some(actor.user_id),
            serde_json::json!({ "credits": invoice.reference, "reason": reason }),
        )
        .await?;

        Ok(DocumentDetail { document, lines })
    }

    /// Point the invoice at its latest credit note, cancelling it when asked
    async fn attach_credit_note(
        &self,
        conn: &mut PgConnection,
        actor: &Actor,
        invoice: &Document,
        credit_note: &Document,
        cancel: bool,
    ) -> ApiResult<Document> {
        let status = if cancel {
            DocumentStatus::Annule
        } else {
            invoice.status
        };
        let updated = sqlx::query_as::<_, Document>(
            r#"
            UPDATE documents
            SET credit_note_ref = $3, status = $4, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(invoice.id)
        .bind(invoice.status)
        .bind(&credit_note.reference)
        .bind(status)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| store::concurrent_change(invoice))?;

        store::record_event(
            conn,
            invoice.id,
            DocumentEventKind::CreditNoteIssued,
            Some(actor.user_id),
            serde_json::json!({
                "credit_note": credit_note.reference,
                "amount_ttc": credit_note.amount_ttc,
            }),
        )
        .await?;
        if cancel {
            store::record_event(
                conn,
                invoice.id,
                DocumentEventKind::Cancelled,
                Some(actor.user_id),
                serde_json::json!({ "credit_note": credit_note.reference }),
            )
            .await?;
            log_transition(actor, invoice, &updated);
        }
        Ok(updated)
    }

    /// Render through the configured renderer, store the file and save its URL
    async fn render_and_store(
        &self,
        conn: &mut PgConnection,
        document: &Document,
        lines: &[DocumentLine],
        brand: &Brand,
    ) -> ApiResult<Document> {
        let data = build_render_data(document, lines, brand, None);
        let rendered = self.renderer.render(&data).await.map_err(|e| {
            tracing::error!(reference = %document.reference, error = %e, "Document rendering failed");
            ApiError::ExternalDependency(format!("Rendering {} failed: {}", document.reference, e))
        })?;

        let key = format!("documents/{}.{}", document.reference, rendered.extension);
        let url = self
            .files
            .put(&key, rendered.bytes, &rendered.content_type)
            .await
            .map_err(|e| {
                tracing::error!(reference = %document.reference, error = %e, "Storing rendered document failed");
                ApiError::ExternalDependency(format!("Storing {} failed: {}", document.reference, e))
            })?;

        let updated = sqlx::query_as::<_, Document>(
            "UPDATE documents SET pdf_url = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(document.id)
        .bind(&url)
        .fetch_one(&mut *conn)
        .await?;
        Ok(updated)
    }

    async fn notify_credit_note(&self, invoice: &Document, credit_note: &Document) {
        let manager = match self.db_pool.acquire().await {
            Ok(mut conn) => collaboration_manager(&mut conn, invoice.collaboration_id).await,
            Err(e) => Err(e.into()),
        };
        match manager {
            Ok(Some(manager_id)) => {
                self.notifier.dispatch_detached(vec![PendingNotification::to_user(
                    manager_id,
                    NotificationKind::CreditNoteIssued,
                    "Credit note issued",
                    format!(
                        "{} credits {} for {}",
                        credit_note.reference, invoice.reference, credit_note.amount_ttc
                    ),
                )
                .with_link(document_link(credit_note))]);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(invoice = %invoice.reference, error = %e, "Could not resolve credit note recipient");
            }
        }
    }
}

pub(crate) fn invoice_paid_notification(manager_id: Uuid, invoice: &Document) -> PendingNotification {
    PendingNotification::to_user(
        manager_id,
        NotificationKind::InvoicePaid,
        "Invoice paid",
        format!("{} was paid ({})", invoice.reference, invoice.amount_ttc),
    )
    .with_link(document_link(invoice))
}

/// Manager assigned to the collaboration a document belongs to
pub(crate) async fn collaboration_manager(
    conn: &mut PgConnection,
    collaboration_id: Option<Uuid>,
) -> ApiResult<Option<Uuid>> {
    let Some(collaboration_id) = collaboration_id else {
        return Ok(None);
    };
    let manager: Option<(Option<Uuid>,)> =
        sqlx::query_as("SELECT manager_id FROM collaborations WHERE id = $1")
            .bind(collaboration_id)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(manager.and_then(|(id,)| id))
}

async fn fetch_brand(conn: &mut PgConnection, id: Uuid) -> ApiResult<Brand> {
    sqlx::query_as::<_, Brand>("SELECT * FROM brands WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Brand {} not found", id)))
}

async fn fetch_credit_notes(conn: &mut PgConnection, invoice_id: Uuid) -> ApiResult<Vec<Document>> {
    let notes = sqlx::query_as::<_, Document>(
        r#"
        SELECT * FROM documents
        WHERE credited_document_id = $1 AND doc_type = 'AVOIR'
        ORDER BY created_at
        "#,
    )
    .bind(invoice_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(notes)
}

/// Quantity already credited per invoice line
async fn credited_quantities(
    conn: &mut PgConnection,
    invoice_id: Uuid,
) -> ApiResult<HashMap<Uuid, Decimal>> {
    let rows: Vec<(Uuid, Decimal)> = sqlx::query_as(
        r#"
        SELECT l.source_line_id, SUM(l.quantity)
        FROM document_lines l
        JOIN documents d ON d.id = l.document_id
        WHERE d.credited_document_id = $1
          AND d.doc_type = 'AVOIR'
          AND l.source_line_id IS NOT NULL
        GROUP BY l.source_line_id
        "#,
    )
    .bind(invoice_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().collect())
}

/// Guard for the one-live-invoice rule; the partial unique index backs it
async fn ensure_no_active_invoice(conn: &mut PgConnection, collaboration_id: Uuid) -> ApiResult<()> {
    let existing: Option<(String, DocumentStatus)> = sqlx::query_as(
        r#"
        SELECT reference, status FROM documents
        WHERE collaboration_id = $1 AND doc_type = 'FACTURE' AND status <> 'ANNULE'
        LIMIT 1
        "#,
    )
    .bind(collaboration_id)
    .fetch_optional(&mut *conn)
    .await?;

    match existing {
        Some((reference, status)) => Err(ApiError::state_conflict(
            format!("Collaboration already has an active invoice ({})", reference),
            status,
        )),
        None => Ok(()),
    }
}

fn resolve_vat(brand: &Brand, regime_override: Option<VatRegime>) -> VatResolution {
    match regime_override {
        Some(regime) => VatResolution::for_regime(regime),
        None => vat::resolve(&brand.country, brand.vat_number()),
    }
}

fn copy_line(line: &DocumentLine) -> ComputedLine {
    ComputedLine {
        position: line.position,
        description: line.description.clone(),
        quantity: line.quantity,
        unit_price: line.unit_price,
        vat_rate: line.vat_rate,
        total_ht: line.total_ht,
        source_line_id: None,
    }
}

fn append_note(existing: Option<&str>, addition: Option<String>) -> Option<String> {
    match (existing.filter(|n| !n.trim().is_empty()), addition) {
        (Some(existing), Some(addition)) => Some(format!("{}\n{}", existing, addition)),
        (None, Some(addition)) => Some(addition),
        (existing, None) => existing.map(str::to_string),
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn document_link(document: &Document) -> String {
    format!("/documents/{}", document.id)
}

fn log_transition(actor: &Actor, before: &Document, after: &Document) {
    tracing::info!(
        reference = %after.reference,
        from = %before.status,
        to = %after.status,
        actor = %actor.user_id,
        "Document transitioned"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_note() {
        assert_eq!(append_note(None, None), None);
        assert_eq!(
            append_note(Some("Net 30"), Some("Refused: budget".into())).as_deref(),
            Some("Net 30\nRefused: budget")
        );
        assert_eq!(
            append_note(Some("  "), Some("Refused: budget".into())).as_deref(),
            Some("Refused: budget")
        );
        assert_eq!(append_note(Some("Net 30"), None).as_deref(), Some("Net 30"));
    }

    #[test]
    fn test_vat_override_wins_over_brand() {
        let brand = Brand {
            id: Uuid::new_v4(),
            name: "Acme".into(),
            legal_name: None,
            address: None,
            postal_code: None,
            city: None,
            country: "Allemagne".into(),
            vat_number: Some("DE123456789".into()),
            payment_terms_days: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(resolve_vat(&brand, None).regime, VatRegime::EuIntracom);
        let forced = resolve_vat(&brand, Some(VatRegime::France));
        assert_eq!(forced.regime, VatRegime::France);
        assert_eq!(forced.rate, vat::STANDARD_VAT_RATE);
    }
}
