//! Document persistence shared by the document service and reconciliation

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use super::model::{
    Document, DocumentEventKind, DocumentLine, DocumentStatus, DocumentType,
};
use super::rules;
use crate::auth::Actor;
use crate::collaboration::store as collaboration_store;
use crate::error::{ApiError, ApiResult};
use crate::pricing::{ComputedDocument, ComputedLine};
use crate::vat::VatResolution;

/// Row values of a document about to be inserted
pub(crate) struct NewDocument<'a> {
    pub reference: &'a str,
    pub doc_type: DocumentType,
    pub status: DocumentStatus,
    pub collaboration_id: Option<Uuid>,
    pub brand_id: Uuid,
    pub title: &'a str,
    pub vat: &'a VatResolution,
    pub computed: &'a ComputedDocument,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub invoice_ref: Option<&'a str>,
    pub credited_document_id: Option<Uuid>,
    pub notes: Option<&'a str>,
    pub created_by: Uuid,
}

/// How a payment arrived
#[derive(Debug, Clone)]
pub(crate) struct Payment {
    pub date: NaiveDate,
    pub reference: Option<String>,
    pub method: Option<String>,
    /// `manual` or `bank:<external id>`
    pub source: String,
}

pub(crate) async fn fetch_document(conn: &mut PgConnection, id: Uuid) -> ApiResult<Document> {
    sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| not_found(id))
}

pub(crate) async fn lock_document(conn: &mut PgConnection, id: Uuid) -> ApiResult<Document> {
    sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| not_found(id))
}

pub(crate) async fn fetch_lines(
    conn: &mut PgConnection,
    document_id: Uuid,
) -> ApiResult<Vec<DocumentLine>> {
    let lines = sqlx::query_as::<_, DocumentLine>(
        "SELECT * FROM document_lines WHERE document_id = $1 ORDER BY position",
    )
    .bind(document_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(lines)
}

pub(crate) async fn insert_document(
    conn: &mut PgConnection,
    new: &NewDocument<'_>,
) -> ApiResult<Document> {
    let totals = new.computed.totals;
    let document = sqlx::query_as::<_, Document>(
        r#"
        INSERT INTO documents (
            id, reference, doc_type, status, collaboration_id, brand_id, title,
            vat_regime, vat_rate, vat_mention, amount_ht, amount_tva, amount_ttc,
            issue_date, due_date, invoice_ref, credited_document_id, notes,
            created_by, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(new.reference)
    .bind(new.doc_type)
    .bind(new.status)
    .bind(new.collaboration_id)
    .bind(new.brand_id)
    .bind(new.title)
    .bind(new.vat.regime)
    .bind(new.vat.rate)
    .bind(new.vat.legal_mention.as_deref())
    .bind(totals.amount_ht)
    .bind(totals.amount_tva)
    .bind(totals.amount_ttc)
    .bind(new.issue_date)
    .bind(new.due_date)
    .bind(new.invoice_ref)
    .bind(new.credited_document_id)
    .bind(new.notes)
    .bind(new.created_by)
    .fetch_one(&mut *conn)
    .await?;

    Ok(document)
}

pub(crate) async fn insert_lines(
    conn: &mut PgConnection,
    document_id: Uuid,
    lines: &[ComputedLine],
) -> ApiResult<Vec<DocumentLine>> {
    let mut inserted = Vec::with_capacity(lines.len());
    for line in lines {
        let row = sqlx::query_as::<_, DocumentLine>(
            r#"
            INSERT INTO document_lines (
                id, document_id, position, description, quantity, unit_price,
                vat_rate, total_ht, source_line_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(document_id)
        .bind(line.position)
        .bind(&line.description)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.vat_rate)
        .bind(line.total_ht)
        .bind(line.source_line_id)
        .fetch_one(&mut *conn)
        .await?;
        inserted.push(row);
    }
    Ok(inserted)
}

pub(crate) async fn replace_lines(
    conn: &mut PgConnection,
    document_id: Uuid,
    lines: &[ComputedLine],
) -> ApiResult<Vec<DocumentLine>> {
    sqlx::query("DELETE FROM document_lines WHERE document_id = $1")
        .bind(document_id)
        .execute(&mut *conn)
        .await?;
    insert_lines(conn, document_id, lines).await
}

pub(crate) async fn record_event(
    conn: &mut PgConnection,
    document_id: Uuid,
    kind: DocumentEventKind,
    actor_id: Option<Uuid>,
    payload: serde_json::Value,
) -> ApiResult<()> {
    sqlx::query(
        r#"
        INSERT INTO document_events (id, document_id, kind, actor_id, payload, created_at)
        VALUES ($1, $2, $3, $4, $5, NOW())
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(document_id)
    .bind(kind.as_str())
    .bind(actor_id)
    .bind(payload)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Mark an invoice PAYE and stamp the collaboration's brand payment.
/// The talent side of the collaboration is left alone.
pub(crate) async fn apply_payment(
    conn: &mut PgConnection,
    document: &Document,
    payment: &Payment,
    actor: Option<&Actor>,
) -> ApiResult<Document> {
    rules::ensure_can_mark_paid(document)?;

    let paid = sqlx::query_as::<_, Document>(
        r#"
        UPDATE documents
        SET status = 'PAYE',
            payment_date = $3,
            payment_reference = $4,
            payment_method = $5,
            updated_at = NOW()
        WHERE id = $1 AND status = $2
        RETURNING *
        "#,
    )
    .bind(document.id)
    .bind(document.status)
    .bind(payment.date)
    .bind(payment.reference.as_deref())
    .bind(payment.method.as_deref())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| concurrent_change(document))?;

    record_event(
        conn,
        paid.id,
        DocumentEventKind::Payment,
        actor.map(|a| a.user_id),
        serde_json::json!({
            "payment_date": payment.date,
            "payment_reference": payment.reference,
            "payment_method": payment.method,
            "amount_ttc": paid.amount_ttc,
            "source": payment.source,
        }),
    )
    .await?;

    if let Some(collaboration_id) = paid.collaboration_id {
        let paid_at = Utc.from_utc_datetime(&payment.date.and_time(NaiveTime::MIN));
        collaboration_store::set_brand_paid(conn, collaboration_id, Some(paid_at)).await?;
    }

    tracing::info!(
        reference = %paid.reference,
        from = %document.status,
        to = %paid.status,
        actor = ?actor.map(|a| a.user_id),
        source = %payment.source,
        "Document transitioned"
    );
    Ok(paid)
}

pub(crate) fn not_found(id: Uuid) -> ApiError {
    ApiError::NotFound(format!("Document {} not found", id))
}

pub(crate) fn concurrent_change(document: &Document) -> ApiError {
    ApiError::state_conflict(
        format!("{} changed concurrently", document.reference),
        document.status,
    )
}
