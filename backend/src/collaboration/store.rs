//! Collaboration writes that run inside another module's transaction

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use super::model::{
    Collaboration, CollaborationDeliverable, CollaborationStatus, NewCollaboration,
    NewCollaborationDeliverable,
};
use super::rules::advance_target;
use crate::error::{ApiError, ApiResult};

pub(crate) async fn insert_collaboration(
    conn: &mut PgConnection,
    new: &NewCollaboration,
) -> ApiResult<Collaboration> {
    let collaboration = sqlx::query_as::<_, Collaboration>(
        r#"
        INSERT INTO collaborations (
            id, reference, negotiation_id, talent_id, brand_id, manager_id, title,
            source, status, gross_amount, commission_percent, commission_amount,
            net_amount, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&new.reference)
    .bind(new.negotiation_id)
    .bind(new.talent_id)
    .bind(new.brand_id)
    .bind(new.manager_id)
    .bind(&new.title)
    .bind(new.source)
    .bind(new.status)
    .bind(new.gross_amount)
    .bind(new.commission.commission_rate)
    .bind(new.commission.commission_amount)
    .bind(new.commission.net_amount)
    .fetch_one(&mut *conn)
    .await?;

    Ok(collaboration)
}

pub(crate) async fn insert_deliverables(
    conn: &mut PgConnection,
    collaboration_id: Uuid,
    deliverables: &[NewCollaborationDeliverable],
) -> ApiResult<Vec<CollaborationDeliverable>> {
    let mut inserted = Vec::with_capacity(deliverables.len());
    for (position, deliverable) in deliverables.iter().enumerate() {
        let row = sqlx::query_as::<_, CollaborationDeliverable>(
            r#"
            INSERT INTO collaboration_deliverables (
                id, collaboration_id, position, kind, description, quantity, unit_price, delivered
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(collaboration_id)
        .bind(position as i32)
        .bind(&deliverable.kind)
        .bind(&deliverable.description)
        .bind(deliverable.quantity)
        .bind(deliverable.unit_price)
        .fetch_one(&mut *conn)
        .await?;
        inserted.push(row);
    }
    Ok(inserted)
}

pub(crate) async fn lock_collaboration(
    conn: &mut PgConnection,
    id: Uuid,
) -> ApiResult<Collaboration> {
    sqlx::query_as::<_, Collaboration>("SELECT * FROM collaborations WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Collaboration {} not found", id)))
}

pub(crate) async fn fetch_deliverables(
    conn: &mut PgConnection,
    collaboration_id: Uuid,
) -> ApiResult<Vec<CollaborationDeliverable>> {
    let rows = sqlx::query_as::<_, CollaborationDeliverable>(
        "SELECT * FROM collaboration_deliverables WHERE collaboration_id = $1 ORDER BY position",
    )
    .bind(collaboration_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

pub(crate) async fn set_status(
    conn: &mut PgConnection,
    id: Uuid,
    status: CollaborationStatus,
) -> ApiResult<Collaboration> {
    let collaboration = sqlx::query_as::<_, Collaboration>(
        "UPDATE collaborations SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(status)
    .fetch_one(&mut *conn)
    .await?;
    Ok(collaboration)
}

/// Move forward to `target` if the collaboration is behind it. Returns the
/// updated row when something changed.
pub(crate) async fn advance(
    conn: &mut PgConnection,
    id: Uuid,
    target: CollaborationStatus,
) -> ApiResult<Option<Collaboration>> {
    let current = lock_collaboration(conn, id).await?;
    let Some(next) = advance_target(current.status, target) else {
        tracing::debug!(
            collaboration = %current.reference,
            status = %current.status,
            target = %target,
            "Collaboration already at or past target"
        );
        return Ok(None);
    };

    let updated = set_status(conn, id, next).await?;
    tracing::info!(
        reference = %updated.reference,
        from = %current.status,
        to = %next,
        "Collaboration advanced"
    );
    Ok(Some(updated))
}

/// Mark lost unless the deal was already paid or lost
pub(crate) async fn mark_lost(
    conn: &mut PgConnection,
    id: Uuid,
    reason: &str,
) -> ApiResult<Option<Collaboration>> {
    let current = lock_collaboration(conn, id).await?;
    if current.status.is_terminal() {
        return Ok(None);
    }

    let updated = sqlx::query_as::<_, Collaboration>(
        r#"
        UPDATE collaborations
        SET status = 'PERDU', lost_reason = $2, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(reason)
    .fetch_one(&mut *conn)
    .await?;

    tracing::info!(
        reference = %updated.reference,
        from = %current.status,
        to = "PERDU",
        "Collaboration lost"
    );
    Ok(Some(updated))
}

/// Brand-side payment only; talent payment is tracked separately
pub(crate) async fn set_brand_paid(
    conn: &mut PgConnection,
    id: Uuid,
    paid_at: Option<DateTime<Utc>>,
) -> ApiResult<Collaboration> {
    let collaboration = sqlx::query_as::<_, Collaboration>(
        "UPDATE collaborations SET brand_paid_at = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(paid_at)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("Collaboration {} not found", id)))?;
    Ok(collaboration)
}
