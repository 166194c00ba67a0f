//! Collaboration service - lifecycle of won deals

use sqlx::PgPool;
use uuid::Uuid;

use super::model::{
    Collaboration, CollaborationDetail, CollaborationStatus, ListCollaborationsQuery,
};
use super::rules;
use super::store;
use crate::auth::{authorize, authorize_owner, Action, Actor};
use crate::error::{ApiError, ApiResult};
use crate::models::{PaginatedResponse, PaginationParams};
use crate::notification::{NotificationKind, Notifier, PendingNotification};
use crate::pricing::commission_for_rate;

#[derive(Clone)]
pub struct CollaborationService {
    db_pool: PgPool,
    notifier: Notifier,
}

impl CollaborationService {
    pub fn new(db_pool: PgPool, notifier: Notifier) -> Self {
        Self { db_pool, notifier }
    }

    pub async fn get(&self, id: Uuid) -> ApiResult<CollaborationDetail> {
        let mut conn = self.db_pool.acquire().await?;
        let collaboration =
            sqlx::query_as::<_, Collaboration>("SELECT * FROM collaborations WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("Collaboration {} not found", id)))?;
        let deliverables = store::fetch_deliverables(&mut conn, id).await?;

        Ok(CollaborationDetail {
            collaboration,
            deliverables,
        })
    }

    pub async fn list(
        &self,
        query: ListCollaborationsQuery,
    ) -> ApiResult<PaginatedResponse<Collaboration>> {
        let (page, limit, offset) = PaginationParams {
            page: query.page,
            limit: query.limit,
        }
        .resolve();

        let mut query_builder = sqlx::QueryBuilder::new("SELECT * FROM collaborations WHERE 1=1");
        let mut count_builder =
            sqlx::QueryBuilder::new("SELECT COUNT(*) FROM collaborations WHERE 1=1");

        if let Some(status) = query.status {
            query_builder.push(" AND status = ");
            query_builder.push_bind(status);
            count_builder.push(" AND status = ");
            count_builder.push_bind(status);
        }
        if let Some(talent_id) = query.talent_id {
            query_builder.push(" AND talent_id = ");
            query_builder.push_bind(talent_id);
            count_builder.push(" AND talent_id = ");
            count_builder.push_bind(talent_id);
        }
        if let Some(brand_id) = query.brand_id {
            query_builder.push(" AND brand_id = ");
            query_builder.push_bind(brand_id);
            count_builder.push(" AND brand_id = ");
            count_builder.push_bind(brand_id);
        }
        if let Some(manager_id) = query.manager_id {
            query_builder.push(" AND manager_id = ");
            query_builder.push_bind(manager_id);
            count_builder.push(" AND manager_id = ");
            count_builder.push_bind(manager_id);
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
            .build_query_as::<Collaboration>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(PaginatedResponse {
            data,
            total,
            page,
            limit,
        })
    }

    /// GAGNE -> EN_COURS
    pub async fn start_production(&self, actor: &Actor, id: Uuid) -> ApiResult<Collaboration> {
        self.progress(actor, id, CollaborationStatus::EnCours).await
    }

    pub async fn mark_published(
        &self,
        actor: &Actor,
        id: Uuid,
        publication_date: chrono::NaiveDate,
    ) -> ApiResult<Collaboration> {
        authorize(actor, Action::ProgressCollaboration)?;

        let mut tx = self.db_pool.begin().await?;
        let current = store::lock_collaboration(&mut tx, id).await?;
        ensure_manager(actor, &current)?;
        rules::ensure_transition(current.status, CollaborationStatus::Publie)?;

        let updated = sqlx::query_as::<_, Collaboration>(
            r#"
            UPDATE collaborations
            SET status = 'PUBLIE', publication_date = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(publication_date)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        log_transition(actor, &current, &updated);
        Ok(updated)
    }

    /// Store the talent's invoice URL and move to FACTURE_RECUE. A new upload
    /// replaces the previous one and resets its validation.
    pub async fn record_talent_invoice(
        &self,
        actor: &Actor,
        id: Uuid,
        url: &str,
    ) -> ApiResult<Collaboration> {
        authorize(actor, Action::ProgressCollaboration)?;
        let url = url.trim();
        if url.is_empty() {
            return Err(ApiError::validation("url", "Invoice URL is required"));
        }

        let mut tx = self.db_pool.begin().await?;
        let current = store::lock_collaboration(&mut tx, id).await?;
        ensure_manager(actor, &current)?;
        rules::ensure_transition(current.status, CollaborationStatus::FactureRecue)?;

        let updated = sqlx::query_as::<_, Collaboration>(
            r#"
            UPDATE collaborations
            SET status = 'FACTURE_RECUE',
                talent_invoice_url = $2,
                talent_invoice_received_at = NOW(),
                talent_invoice_validated = FALSE,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(url)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        log_transition(actor, &current, &updated);

        self.notifier.dispatch_detached(vec![PendingNotification::to_roles(
            Action::ValidateTalentInvoice.allowed_roles(),
            NotificationKind::TalentInvoiceReceived,
            "Talent invoice received",
            format!("A talent invoice was uploaded for {}", updated.reference),
        )
        .with_link(format!("/collaborations/{}", updated.id))]);

        Ok(updated)
    }

    pub async fn validate_talent_invoice(
        &self,
        actor: &Actor,
        id: Uuid,
    ) -> ApiResult<Collaboration> {
        authorize(actor, Action::ValidateTalentInvoice)?;

        let mut tx = self.db_pool.begin().await?;
        let current = store::lock_collaboration(&mut tx, id).await?;
        rules::ensure_can_validate_talent_invoice(&current)?;

        let updated = sqlx::query_as::<_, Collaboration>(
            r#"
            UPDATE collaborations
            SET talent_invoice_validated = TRUE, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(reference = %updated.reference, actor = %actor.user_id, "Talent invoice validated");
        Ok(updated)
    }

    /// FACTURE_RECUE -> PAYE, the agency paid the talent
    pub async fn mark_talent_paid(&self, actor: &Actor, id: Uuid) -> ApiResult<Collaboration> {
        authorize(actor, Action::MarkTalentPaid)?;

        let mut tx = self.db_pool.begin().await?;
        let current = store::lock_collaboration(&mut tx, id).await?;
        rules::ensure_can_pay_talent(&current)?;

        let updated = sqlx::query_as::<_, Collaboration>(
            r#"
            UPDATE collaborations
            SET status = 'PAYE', paid_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'FACTURE_RECUE'
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::state_conflict("Collaboration changed concurrently", current.status))?;

        tx.commit().await?;
        log_transition(actor, &current, &updated);
        Ok(updated)
    }

    pub async fn mark_lost(&self, actor: &Actor, id: Uuid, reason: &str) -> ApiResult<Collaboration> {
        authorize(actor, Action::MarkCollaborationLost)?;
        let reason = rules::ensure_reason(reason)?;

        let mut tx = self.db_pool.begin().await?;
        let current = store::lock_collaboration(&mut tx, id).await?;
        rules::ensure_transition(current.status, CollaborationStatus::Perdu)?;
        let updated = store::mark_lost(&mut tx, id, reason)
            .await?
            .ok_or_else(|| ApiError::state_conflict("Collaboration is closed", current.status))?;
        tx.commit().await?;

        Ok(updated)
    }

    /// Change the gross amount; commission is recomputed at the stored percent
    pub async fn update_amount(
        &self,
        actor: &Actor,
        id: Uuid,
        gross_amount: rust_decimal::Decimal,
    ) -> ApiResult<Collaboration> {
        authorize(actor, Action::EditCollaborationAmount)?;

        let mut tx = self.db_pool.begin().await?;
        let current = store::lock_collaboration(&mut tx, id).await?;
        rules::ensure_amount_editable(&current, gross_amount)?;

        let commission = commission_for_rate(gross_amount, current.commission_percent);
        let updated = sqlx::query_as::<_, Collaboration>(
            r#"
            UPDATE collaborations
            SET gross_amount = $2, commission_amount = $3, net_amount = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(gross_amount)
        .bind(commission.commission_amount)
        .bind(commission.net_amount)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(
            reference = %updated.reference,
            gross = %updated.gross_amount,
            commission = %updated.commission_amount,
            actor = %actor.user_id,
            "Collaboration amount updated"
        );
        Ok(updated)
    }

    async fn progress(
        &self,
        actor: &Actor,
        id: Uuid,
        target: CollaborationStatus,
    ) -> ApiResult<Collaboration> {
        authorize(actor, Action::ProgressCollaboration)?;

        let mut tx = self.db_pool.begin().await?;
        let current = store::lock_collaboration(&mut tx, id).await?;
        ensure_manager(actor, &current)?;
        rules::ensure_transition(current.status, target)?;
        let updated = store::set_status(&mut tx, id, target).await?;
        tx.commit().await?;

        log_transition(actor, &current, &updated);
        Ok(updated)
    }
}

/// Talent managers only act on the deals they manage
fn ensure_manager(actor: &Actor, collaboration: &Collaboration) -> ApiResult<()> {
    match collaboration.manager_id {
        Some(manager_id) => authorize_owner(actor, Action::ProgressCollaboration, manager_id),
        None => Ok(()),
    }
}

fn log_transition(actor: &Actor, before: &Collaboration, after: &Collaboration) {
    tracing::info!(
        reference = %after.reference,
        from = %before.status,
        to = %after.status,
        actor = %actor.user_id,
        "Collaboration transitioned"
    );
}
