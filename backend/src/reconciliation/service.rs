//! Reconciliation service - importing bank credits and matching them to invoices

use std::sync::Arc;

use sqlx::PgPool;

use super::feed::BankFeed;
use super::model::{
    AssociationOutcome, BankTransaction, IncomingTransaction, ListTransactionsQuery, SyncReport,
    SyncRequest,
};
use crate::auth::{authorize, Action, Actor};
use crate::document::{self, store as document_store, DocumentType};
use crate::error::{ApiError, ApiResult};
use crate::models::{PaginatedResponse, PaginationParams};
use crate::notification::Notifier;

const PAYMENT_METHOD: &str = "VIREMENT";

#[derive(Clone)]
pub struct ReconciliationService {
    db_pool: PgPool,
    feed: Option<Arc<dyn BankFeed>>,
    notifier: Notifier,
}

impl ReconciliationService {
    pub fn new(db_pool: PgPool, feed: Option<Arc<dyn BankFeed>>, notifier: Notifier) -> Self {
        Self {
            db_pool,
            feed,
            notifier,
        }
    }

    /// Pull settled credits for the period and import the new ones
    pub async fn sync(&self, actor: &Actor, request: SyncRequest) -> ApiResult<SyncReport> {
        authorize(actor, Action::SyncBankTransactions)?;
        if request.from > request.to {
            return Err(ApiError::validation("from", "Period start is after its end"));
        }

        let feed = self
            .feed
            .as_ref()
            .ok_or_else(|| ApiError::ExternalDependency("No bank feed configured".to_string()))?;
        let transactions = feed
            .settled_credits(request.from, request.to)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Bank feed sync failed");
                ApiError::ExternalDependency(format!("Bank feed failed: {}", e))
            })?;

        let report = self.import(transactions).await?;
        tracing::info!(
            from = %request.from,
            to = %request.to,
            fetched = report.fetched,
            imported = report.imported,
            skipped = report.skipped,
            actor = %actor.user_id,
            "Bank transactions synced"
        );
        Ok(report)
    }

    /// Insert transactions not seen before. Idempotent on the external id;
    /// the batch is applied in one transaction.
    pub async fn import(&self, transactions: Vec<IncomingTransaction>) -> ApiResult<SyncReport> {
        let mut report = SyncReport {
            fetched: transactions.len(),
            ..SyncReport::default()
        };
        let mut tx = self.db_pool.begin().await?;

        for transaction in transactions {
            if !transaction.is_importable() {
                tracing::warn!(
                    external_id = %transaction.external_id,
                    amount = %transaction.amount,
                    "Skipping transaction that is not an importable credit"
                );
                report.skipped += 1;
                continue;
            }

            let inserted = sqlx::query(
                r#"
                INSERT INTO bank_transactions (
                    id, external_id, amount, currency, label, counterparty,
                    external_reference, settled_on, associated, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE, NOW())
                ON CONFLICT (external_id) DO NOTHING
                "#,
            )
            .bind(uuid::Uuid::new_v4())
            .bind(transaction.external_id.trim())
            .bind(transaction.amount)
            .bind(transaction.currency.as_deref().unwrap_or("EUR"))
            .bind(&transaction.label)
            .bind(&transaction.counterparty)
            .bind(&transaction.external_reference)
            .bind(transaction.settled_on)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if inserted > 0 {
                report.imported += 1;
            } else {
                report.skipped += 1;
            }
        }

        tx.commit().await?;
        Ok(report)
    }

    pub async fn list_unmatched(
        &self,
        query: ListTransactionsQuery,
    ) -> ApiResult<PaginatedResponse<BankTransaction>> {
        let (page, limit, offset) = PaginationParams {
            page: query.page,
            limit: query.limit,
        }
        .resolve();

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM bank_transactions WHERE associated = FALSE")
                .fetch_one(&self.db_pool)
                .await?;

        let data = sqlx::query_as::<_, BankTransaction>(
            r#"
            SELECT * FROM bank_transactions
            WHERE associated = FALSE
            ORDER BY settled_on DESC, created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit as i64)
        .bind(offset)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(PaginatedResponse {
            data,
            total,
            page,
            limit,
        })
    }

    /// Match a transaction to an invoice and mark the invoice paid. Only the
    /// brand payment of the collaboration is stamped, never the talent's.
    pub async fn associate(
        &self,
        actor: &Actor,
        external_id: &str,
        document_id: uuid::Uuid,
    ) -> ApiResult<AssociationOutcome> {
        authorize(actor, Action::AssociateBankTransaction)?;

        let mut tx = self.db_pool.begin().await?;
        let transaction = sqlx::query_as::<_, BankTransaction>(
            "SELECT * FROM bank_transactions WHERE external_id = $1 FOR UPDATE",
        )
        .bind(external_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Bank transaction {} not found", external_id)))?;

        if transaction.associated {
            return Err(ApiError::state_conflict(
                format!("Bank transaction {} is already associated", external_id),
                "ASSOCIATED",
            ));
        }

        let invoice = document_store::lock_document(&mut tx, document_id).await?;
        if invoice.doc_type != DocumentType::Facture {
            return Err(ApiError::validation(
                "document_id",
                format!("{} is not an invoice", invoice.reference),
            ));
        }
        if transaction.amount != invoice.amount_ttc {
            tracing::warn!(
                external_id,
                invoice = %invoice.reference,
                amount = %transaction.amount,
                expected = %invoice.amount_ttc,
                "Transaction amount differs from invoice total"
            );
        }

        let payment = document_store::Payment {
            date: transaction.settled_on,
            reference: transaction
                .external_reference
                .clone()
                .or_else(|| Some(transaction.external_id.clone())),
            method: Some(PAYMENT_METHOD.to_string()),
            source: format!("bank:{}", transaction.external_id),
        };
        let paid = document_store::apply_payment(&mut tx, &invoice, &payment, Some(actor)).await?;

        let transaction = sqlx::query_as::<_, BankTransaction>(
            r#"
            UPDATE bank_transactions
            SET associated = TRUE, document_id = $2, associated_at = NOW()
            WHERE id = $1 AND associated = FALSE
            RETURNING *
            "#,
        )
        .bind(transaction.id)
        .bind(paid.id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            ApiError::state_conflict(
                format!("Bank transaction {} changed concurrently", external_id),
                "ASSOCIATED",
            )
        })?;

        let manager = document::collaboration_manager(&mut tx, paid.collaboration_id).await?;
        tx.commit().await?;

        tracing::info!(
            external_id,
            invoice = %paid.reference,
            settled_on = %transaction.settled_on,
            actor = %actor.user_id,
            "Bank transaction associated"
        );

        if let Some(manager_id) = manager {
            self.notifier
                .dispatch_detached(vec![document::invoice_paid_notification(manager_id, &paid)]);
        }

        Ok(AssociationOutcome {
            transaction,
            document: paid,
        })
    }
}
