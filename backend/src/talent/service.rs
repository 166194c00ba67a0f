//! Talent service

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use super::model::{CreateTalentRequest, ListTalentsQuery, Talent, UpdateCommissionRequest};
use crate::auth::{authorize, Action, Actor};
use crate::error::{ApiError, ApiResult};
use crate::models::{PaginatedResponse, PaginationParams};

#[derive(Clone)]
pub struct TalentService {
    db_pool: PgPool,
}

impl TalentService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub async fn create(&self, actor: &Actor, request: CreateTalentRequest) -> ApiResult<Talent> {
        authorize(actor, Action::ManageTalents)?;
        request.validate()?;
        validate_rate("commission_inbound", request.commission_inbound)?;
        validate_rate("commission_outbound", request.commission_outbound)?;

        let talent = sqlx::query_as::<_, Talent>(
            r#"
            INSERT INTO talents (
                id, first_name, last_name, email,
                commission_inbound, commission_outbound, manager_id,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.first_name.trim())
        .bind(request.last_name.trim())
        .bind(request.email)
        .bind(request.commission_inbound)
        .bind(request.commission_outbound)
        .bind(request.manager_id.or(Some(actor.user_id)))
        .fetch_one(&self.db_pool)
        .await?;

        tracing::info!(talent_id = %talent.id, actor = %actor.user_id, "Talent created");
        Ok(talent)
    }

    pub async fn get(&self, id: Uuid) -> ApiResult<Talent> {
        sqlx::query_as::<_, Talent>("SELECT * FROM talents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Talent {} not found", id)))
    }

    pub async fn list(&self, query: ListTalentsQuery) -> ApiResult<PaginatedResponse<Talent>> {
        let (page, limit, offset) = PaginationParams {
            page: query.page,
            limit: query.limit,
        }
        .resolve();

        let mut query_builder = sqlx::QueryBuilder::new("SELECT * FROM talents WHERE 1=1");
        let mut count_builder = sqlx::QueryBuilder::new("SELECT COUNT(*) FROM talents WHERE 1=1");

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

        query_builder.push(" ORDER BY last_name, first_name LIMIT ");
        query_builder.push_bind(limit as i64);
        query_builder.push(" OFFSET ");
        query_builder.push_bind(offset);

        let data = query_builder
            .build_query_as::<Talent>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(PaginatedResponse {
            data,
            total,
            page,
            limit,
        })
    }

    /// New rates apply to deals validated afterwards; existing collaborations
    /// keep the percentage they were computed with.
    pub async fn update_commissions(
        &self,
        actor: &Actor,
        id: Uuid,
        request: UpdateCommissionRequest,
    ) -> ApiResult<Talent> {
        authorize(actor, Action::ManageTalents)?;
        if let Some(rate) = request.commission_inbound {
            validate_rate("commission_inbound", rate)?;
        }
        if let Some(rate) = request.commission_outbound {
            validate_rate("commission_outbound", rate)?;
        }

        let talent = sqlx::query_as::<_, Talent>(
            r#"
            UPDATE talents
            SET commission_inbound = COALESCE($2, commission_inbound),
                commission_outbound = COALESCE($3, commission_outbound),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.commission_inbound)
        .bind(request.commission_outbound)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Talent {} not found", id)))?;

        tracing::info!(
            talent_id = %id,
            inbound = %talent.commission_inbound,
            outbound = %talent.commission_outbound,
            actor = %actor.user_id,
            "Talent commission rates updated"
        );
        Ok(talent)
    }
}

fn validate_rate(field: &str, rate: Decimal) -> ApiResult<()> {
    if rate < Decimal::ZERO || rate > Decimal::ONE_HUNDRED {
        return Err(ApiError::validation(field, "Rate must be between 0 and 100"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rate_bounds() {
        assert!(validate_rate("r", dec!(0)).is_ok());
        assert!(validate_rate("r", dec!(100)).is_ok());
        assert!(validate_rate("r", dec!(27.5)).is_ok());
        assert!(validate_rate("r", dec!(-0.01)).is_err());
        assert!(validate_rate("r", dec!(100.01)).is_err());
    }
}
