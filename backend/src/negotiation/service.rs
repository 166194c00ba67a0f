//! Negotiation service - proposal, review and conversion of deals

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use super::model::{
    CreateNegotiationRequest, DeliverableInput, ListNegotiationsQuery, Negotiation,
    NegotiationDeliverable, NegotiationDetail, UpdateNegotiationRequest,
    ValidationOutcome,
};
use super::rules;
use crate::auth::{authorize, authorize_owner, Action, Actor};
use crate::collaboration::{
    store as collaboration_store, CollaborationDetail, CollaborationStatus, NewCollaboration,
    NewCollaborationDeliverable,
};
use crate::error::{ApiError, ApiResult};
use crate::models::{PaginatedResponse, PaginationParams};
use crate::notification::{NotificationKind, Notifier, PendingNotification};
use crate::pricing::compute_commission;
use crate::reference::{ReferenceFamily, ReferenceGenerator};
use crate::talent::Talent;

#[derive(Clone)]
pub struct NegotiationService {
    db_pool: PgPool,
    references: ReferenceGenerator,
    notifier: Notifier,
}

impl NegotiationService {
    pub fn new(db_pool: PgPool, references: ReferenceGenerator, notifier: Notifier) -> Self {
        Self {
            db_pool,
            references,
            notifier,
        }
    }

    /// Create a draft negotiation with its deliverables
    pub async fn create(
        &self,
        actor: &Actor,
        request: CreateNegotiationRequest,
    ) -> ApiResult<NegotiationDetail> {
        authorize(actor, Action::CreateNegotiation)?;
        request.validate()?;
        rules::validate_deliverables(
            [request.brand_budget, request.desired_budget, request.final_budget],
            &request.deliverables,
        )?;

        let this = self;
        self.references
            .with_retry("create_negotiation", move || {
                this.try_create(actor, request.clone())
            })
            .await
    }

    async fn try_create(
        &self,
        actor: &Actor,
        request: CreateNegotiationRequest,
    ) -> ApiResult<NegotiationDetail> {
        let mut tx = self.db_pool.begin().await?;
        ensure_exists(&mut tx, "talents", request.talent_id, "Talent").await?;
        ensure_exists(&mut tx, "brands", request.brand_id, "Brand").await?;

        let reference = self
            .references
            .next_for_current_year(ReferenceFamily::Negotiation)
            .await?;

        let negotiation = sqlx::query_as::<_, Negotiation>(
            r#"
            INSERT INTO negotiations (
                id, reference, talent_id, brand_id, created_by, title, source, status,
                brand_budget, desired_budget, final_budget, notes, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'BROUILLON', $8, $9, $10, $11, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&reference)
        .bind(request.talent_id)
        .bind(request.brand_id)
        .bind(actor.user_id)
        .bind(request.title.trim())
        .bind(request.source)
        .bind(request.brand_budget)
        .bind(request.desired_budget)
        .bind(request.final_budget)
        .bind(&request.notes)
        .fetch_one(&mut *tx)
        .await?;

        let deliverables = insert_deliverables(&mut tx, negotiation.id, &request.deliverables).await?;
        tx.commit().await?;

        tracing::info!(
            reference = %negotiation.reference,
            to = %negotiation.status,
            actor = %actor.user_id,
            "Negotiation created"
        );
        Ok(NegotiationDetail {
            negotiation,
            deliverables,
        })
    }

    pub async fn get(&self, id: Uuid) -> ApiResult<NegotiationDetail> {
        let mut conn = self.db_pool.acquire().await?;
        let negotiation =
            sqlx::query_as::<_, Negotiation>("SELECT * FROM negotiations WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?
                .ok_or_else(|| not_found(id))?;
        let deliverables = fetch_deliverables(&mut conn, id).await?;

        Ok(NegotiationDetail {
            negotiation,
            deliverables,
        })
    }

    pub async fn list(
        &self,
        query: ListNegotiationsQuery,
    ) -> ApiResult<PaginatedResponse<Negotiation>> {
        let (page, limit, offset) = PaginationParams {
            page: query.page,
            limit: query.limit,
        }
        .resolve();

        let mut query_builder = sqlx::QueryBuilder::new("SELECT * FROM negotiations WHERE 1=1");
        let mut count_builder =
            sqlx::QueryBuilder::new("SELECT COUNT(*) FROM negotiations WHERE 1=1");

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

        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.db_pool)
            .await?;

        query_builder.push(" ORDER BY created_at DESC LIMIT ");
        query_builder.push_bind(limit as i64);
        query_builder.push(" OFFSET ");
        query_builder.push_bind(offset);

        let data = query_builder
            .build_query_as::<Negotiation>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(PaginatedResponse {
            data,
            total,
            page,
            limit,
        })
    }

    /// Edit fields and optionally replace the deliverable list
    pub async fn update(
        &self,
        actor: &Actor,
        id: Uuid,
        request: UpdateNegotiationRequest,
    ) -> ApiResult<NegotiationDetail> {
        authorize(actor, Action::EditNegotiation)?;
        request.validate()?;
        rules::validate_deliverables(
            request.budget_values(),
            request.deliverables.as_deref().unwrap_or_default(),
        )?;

        let mut tx = self.db_pool.begin().await?;
        let current = lock_negotiation(&mut tx, id).await?;
        authorize_owner(actor, Action::EditNegotiation, current.created_by)?;
        rules::ensure_editable(&current)?;
        rules::ensure_deliverables_kept(&current, request.deliverables.as_deref())?;

        let negotiation = sqlx::query_as::<_, Negotiation>(
            r#"
            UPDATE negotiations
            SET title = COALESCE($2, title),
                source = COALESCE($3, source),
                brand_budget = CASE WHEN $4 THEN $5 ELSE brand_budget END,
                desired_budget = CASE WHEN $6 THEN $7 ELSE desired_budget END,
                final_budget = CASE WHEN $8 THEN $9 ELSE final_budget END,
                notes = COALESCE($10, notes),
                updated_at = NOW()
            WHERE id = $1 AND collaboration_id IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.title.as_deref().map(str::trim))
        .bind(request.source)
        .bind(request.brand_budget.is_some())
        .bind(request.brand_budget.flatten())
        .bind(request.desired_budget.is_some())
        .bind(request.desired_budget.flatten())
        .bind(request.final_budget.is_some())
        .bind(request.final_budget.flatten())
        .bind(&request.notes)
        .fetch_one(&mut *tx)
        .await?;

        let deliverables = match &request.deliverables {
            Some(inputs) => {
                sqlx::query("DELETE FROM negotiation_deliverables WHERE negotiation_id = $1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                insert_deliverables(&mut tx, id, inputs).await?
            }
            None => fetch_deliverables(&mut tx, id).await?,
        };

        tx.commit().await?;
        tracing::info!(reference = %negotiation.reference, actor = %actor.user_id, "Negotiation updated");

        Ok(NegotiationDetail {
            negotiation,
            deliverables,
        })
    }

    /// BROUILLON -> EN_ATTENTE, then every reviewer is told
    pub async fn submit(&self, actor: &Actor, id: Uuid) -> ApiResult<Negotiation> {
        authorize(actor, Action::SubmitNegotiation)?;

        let mut tx = self.db_pool.begin().await?;
        let current = lock_negotiation(&mut tx, id).await?;
        authorize_owner(actor, Action::SubmitNegotiation, current.created_by)?;

        let (deliverable_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM negotiation_deliverables WHERE negotiation_id = $1",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        rules::ensure_can_submit(&current, deliverable_count as usize)?;

        let updated = sqlx::query_as::<_, Negotiation>(
            r#"
            UPDATE negotiations
            SET status = 'EN_ATTENTE', submitted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'BROUILLON' AND collaboration_id IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| concurrent_change(&current))?;

        tx.commit().await?;
        log_transition(actor, &current, &updated);

        self.notifier.dispatch_detached(vec![PendingNotification::to_roles(
            Action::ValidateNegotiation.allowed_roles(),
            NotificationKind::NegotiationSubmitted,
            "Negotiation awaiting review",
            format!("{} - {} was submitted for review", updated.reference, updated.title),
        )
        .with_link(format!("/negotiations/{}", updated.id))]);

        Ok(updated)
    }

    /// EN_ATTENTE -> EN_DISCUSSION
    pub async fn start_discussion(&self, actor: &Actor, id: Uuid) -> ApiResult<Negotiation> {
        authorize(actor, Action::DiscussNegotiation)?;

        let mut tx = self.db_pool.begin().await?;
        let current = lock_negotiation(&mut tx, id).await?;
        rules::ensure_can_discuss(&current)?;

        let updated = sqlx::query_as::<_, Negotiation>(
            r#"
            UPDATE negotiations
            SET status = 'EN_DISCUSSION', updated_at = NOW()
            WHERE id = $1 AND status = 'EN_ATTENTE' AND collaboration_id IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| concurrent_change(&current))?;

        tx.commit().await?;
        log_transition(actor, &current, &updated);
        Ok(updated)
    }

    /// Convert the negotiation into a GAGNE collaboration, atomically
    pub async fn validate(&self, actor: &Actor, id: Uuid) -> ApiResult<ValidationOutcome> {
        authorize(actor, Action::ValidateNegotiation)?;

        let this = self;
        let outcome = self
            .references
            .with_retry("validate_negotiation", move || this.try_validate(actor, id))
            .await?;

        self.notifier.dispatch_detached(vec![PendingNotification::to_user(
            outcome.negotiation.created_by,
            NotificationKind::NegotiationValidated,
            "Negotiation validated",
            format!(
                "{} was validated and became {}",
                outcome.negotiation.reference, outcome.collaboration.collaboration.reference
            ),
        )
        .with_link(format!(
            "/collaborations/{}",
            outcome.collaboration.collaboration.id
        ))]);

        Ok(outcome)
    }

    async fn try_validate(&self, actor: &Actor, id: Uuid) -> ApiResult<ValidationOutcome> {
        let mut tx = self.db_pool.begin().await?;
        let current = lock_negotiation(&mut tx, id).await?;
        rules::ensure_can_review(&current)?;

        let talent = sqlx::query_as::<_, Talent>("SELECT * FROM talents WHERE id = $1")
            .bind(current.talent_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Talent {} not found", current.talent_id)))?;
        let deliverables = fetch_deliverables(&mut tx, id).await?;

        let gross_amount = rules::gross_amount(&current);
        let commission = compute_commission(gross_amount, current.source, &talent);
        let reference = self
            .references
            .next_for_current_year(ReferenceFamily::Collaboration)
            .await?;

        let collaboration = collaboration_store::insert_collaboration(
            &mut tx,
            &NewCollaboration {
                reference,
                negotiation_id: Some(current.id),
                talent_id: current.talent_id,
                brand_id: current.brand_id,
                manager_id: talent.manager_id.or(Some(current.created_by)),
                title: current.title.clone(),
                source: current.source,
                status: CollaborationStatus::Gagne,
                gross_amount,
                commission,
            },
        )
        .await?;

        let copied: Vec<NewCollaborationDeliverable> = deliverables
            .iter()
            .map(|d| NewCollaborationDeliverable {
                kind: d.kind.clone(),
                description: d.description.clone(),
                quantity: d.quantity,
                unit_price: rules::deliverable_unit_price(d),
            })
            .collect();
        let collaboration_deliverables =
            collaboration_store::insert_deliverables(&mut tx, collaboration.id, &copied).await?;

        // Check-and-set: a concurrent validator that got here first wins
        let negotiation = sqlx::query_as::<_, Negotiation>(
            r#"
            UPDATE negotiations
            SET status = 'VALIDEE', reviewed_by = $2, reviewed_at = NOW(),
                collaboration_id = $3, updated_at = NOW()
            WHERE id = $1
              AND collaboration_id IS NULL
              AND status IN ('BROUILLON', 'EN_ATTENTE', 'EN_DISCUSSION')
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(actor.user_id)
        .bind(collaboration.id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| concurrent_change(&current))?;

        tx.commit().await?;

        log_transition(actor, &current, &negotiation);
        tracing::info!(
            reference = %collaboration.reference,
            negotiation = %negotiation.reference,
            gross = %collaboration.gross_amount,
            commission = %collaboration.commission_amount,
            net = %collaboration.net_amount,
            "Collaboration created"
        );

        Ok(ValidationOutcome {
            negotiation,
            collaboration: CollaborationDetail {
                collaboration,
                deliverables: collaboration_deliverables,
            },
        })
    }

    pub async fn refuse(
        &self,
        actor: &Actor,
        id: Uuid,
        reason: Option<String>,
    ) -> ApiResult<Negotiation> {
        authorize(actor, Action::RefuseNegotiation)?;
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        let mut tx = self.db_pool.begin().await?;
        let current = lock_negotiation(&mut tx, id).await?;
        rules::ensure_can_review(&current)?;

        let updated = sqlx::query_as::<_, Negotiation>(
            r#"
            UPDATE negotiations
            SET status = 'REFUSEE', refusal_reason = $2, reviewed_by = $3,
                reviewed_at = NOW(), updated_at = NOW()
            WHERE id = $1
              AND collaboration_id IS NULL
              AND status IN ('BROUILLON', 'EN_ATTENTE', 'EN_DISCUSSION')
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&reason)
        .bind(actor.user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| concurrent_change(&current))?;

        tx.commit().await?;
        log_transition(actor, &current, &updated);

        let message = match &reason {
            Some(reason) => format!("{} was refused: {}", updated.reference, reason),
            None => format!("{} was refused", updated.reference),
        };
        self.notifier.dispatch_detached(vec![PendingNotification::to_user(
            updated.created_by,
            NotificationKind::NegotiationRefused,
            "Negotiation refused",
            message,
        )
        .with_link(format!("/negotiations/{}", updated.id))]);

        Ok(updated)
    }

    /// Only a negotiation that never spawned a collaboration can be deleted
    pub async fn delete(&self, actor: &Actor, id: Uuid) -> ApiResult<()> {
        authorize(actor, Action::DeleteNegotiation)?;

        let mut tx = self.db_pool.begin().await?;
        let current = lock_negotiation(&mut tx, id).await?;
        authorize_owner(actor, Action::DeleteNegotiation, current.created_by)?;
        rules::ensure_can_delete(&current)?;

        let result =
            sqlx::query("DELETE FROM negotiations WHERE id = $1 AND collaboration_id IS NULL")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        if result.rows_affected() == 0 {
            return Err(concurrent_change(&current));
        }

        tx.commit().await?;
        tracing::info!(reference = %current.reference, actor = %actor.user_id, "Negotiation deleted");
        Ok(())
    }
}

async fn lock_negotiation(conn: &mut PgConnection, id: Uuid) -> ApiResult<Negotiation> {
    sqlx::query_as::<_, Negotiation>("SELECT * FROM negotiations WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| not_found(id))
}

async fn fetch_deliverables(
    conn: &mut PgConnection,
    negotiation_id: Uuid,
) -> ApiResult<Vec<NegotiationDeliverable>> {
    let rows = sqlx::query_as::<_, NegotiationDeliverable>(
        "SELECT * FROM negotiation_deliverables WHERE negotiation_id = $1 ORDER BY position",
    )
    .bind(negotiation_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

async fn insert_deliverables(
    conn: &mut PgConnection,
    negotiation_id: Uuid,
    inputs: &[DeliverableInput],
) -> ApiResult<Vec<NegotiationDeliverable>> {
    let mut inserted = Vec::with_capacity(inputs.len());
    for (position, input) in inputs.iter().enumerate() {
        let row = sqlx::query_as::<_, NegotiationDeliverable>(
            r#"
            INSERT INTO negotiation_deliverables (
                id, negotiation_id, position, kind, description, quantity,
                requested_price, desired_price, final_price
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(negotiation_id)
        .bind(position as i32)
        .bind(input.kind.trim())
        .bind(&input.description)
        .bind(input.quantity)
        .bind(input.requested_price)
        .bind(input.desired_price)
        .bind(input.final_price)
        .fetch_one(&mut *conn)
        .await?;
        inserted.push(row);
    }
    Ok(inserted)
}

async fn ensure_exists(
    conn: &mut PgConnection,
    table: &'static str,
    id: Uuid,
    label: &str,
) -> ApiResult<()> {
    let query = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)", table);
    let (exists,): (bool,) = sqlx::query_as(&query).bind(id).fetch_one(&mut *conn).await?;
    if exists {
        Ok(())
    } else {
        Err(ApiError::NotFound(format!("{} {} not found", label, id)))
    }
}

fn not_found(id: Uuid) -> ApiError {
    ApiError::NotFound(format!("Negotiation {} not found", id))
}

/// The guarded UPDATE matched nothing: someone else moved the row first
fn concurrent_change(current: &Negotiation) -> ApiError {
    ApiError::state_conflict(
        format!("Negotiation {} was modified concurrently", current.reference),
        current.status,
    )
}

fn log_transition(actor: &Actor, before: &Negotiation, after: &Negotiation) {
    tracing::info!(
        reference = %after.reference,
        from = %before.status,
        to = %after.status,
        actor = %actor.user_id,
        "Negotiation transitioned"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negotiation::NegotiationStatus;

    #[test]
    fn test_concurrent_change_reports_state_seen() {
        let negotiation = Negotiation {
            id: Uuid::new_v4(),
            reference: "NEG-2025-0007".into(),
            talent_id: Uuid::new_v4(),
            brand_id: Uuid::new_v4(),
            created_by: Uuid::new_v4(),
            title: "t".into(),
            source: crate::models::DealSource::Inbound,
            status: NegotiationStatus::EnAttente,
            brand_budget: None,
            desired_budget: None,
            final_budget: None,
            notes: None,
            submitted_at: None,
            reviewed_by: None,
            reviewed_at: None,
            refusal_reason: None,
            collaboration_id: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };

        match concurrent_change(&negotiation) {
            ApiError::StateConflict {
                message,
                current_state,
            } => {
                assert!(message.contains("NEG-2025-0007"));
                assert_eq!(current_state, "EN_ATTENTE");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
