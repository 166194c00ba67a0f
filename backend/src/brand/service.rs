//! Brand service

use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use super::model::{Brand, CreateBrandRequest, ListBrandsQuery, UpdateBillingRequest};
use crate::auth::{authorize, Action, Actor};
use crate::error::{ApiError, ApiResult};
use crate::models::{PaginatedResponse, PaginationParams};

#[derive(Clone)]
pub struct BrandService {
    db_pool: PgPool,
}

impl BrandService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub async fn create(&self, actor: &Actor, request: CreateBrandRequest) -> ApiResult<Brand> {
        authorize(actor, Action::ManageBrands)?;
        request.validate()?;

        let country = request
            .country
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "France".to_string());

        let brand = sqlx::query_as::<_, Brand>(
            r#"
            INSERT INTO brands (
                id, name, legal_name, address, postal_code, city,
                country, vat_number, payment_terms_days, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.name.trim())
        .bind(request.legal_name)
        .bind(request.address)
        .bind(request.postal_code)
        .bind(request.city)
        .bind(country)
        .bind(request.vat_number)
        .bind(request.payment_terms_days)
        .fetch_one(&self.db_pool)
        .await?;

        tracing::info!(brand_id = %brand.id, country = %brand.country, "Brand created");
        Ok(brand)
    }

    pub async fn get(&self, id: Uuid) -> ApiResult<Brand> {
        sqlx::query_as::<_, Brand>("SELECT * FROM brands WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Brand {} not found", id)))
    }

    pub async fn list(&self, query: ListBrandsQuery) -> ApiResult<PaginatedResponse<Brand>> {
        let (page, limit, offset) = PaginationParams {
            page: query.page,
            limit: query.limit,
        }
        .resolve();

        let mut query_builder = sqlx::QueryBuilder::new("SELECT * FROM brands WHERE 1=1");
        let mut count_builder = sqlx::QueryBuilder::new("SELECT COUNT(*) FROM brands WHERE 1=1");

        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search);
            query_builder.push(" AND (name ILIKE ");
            query_builder.push_bind(pattern.clone());
            query_builder.push(" OR legal_name ILIKE ");
            query_builder.push_bind(pattern.clone());
            query_builder.push(")");
            count_builder.push(" AND (name ILIKE ");
            count_builder.push_bind(pattern.clone());
            count_builder.push(" OR legal_name ILIKE ");
            count_builder.push_bind(pattern);
            count_builder.push(")");
        }

        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.db_pool)
            .await?;

        query_builder.push(" ORDER BY name LIMIT ");
        query_builder.push_bind(limit as i64);
        query_builder.push(" OFFSET ");
        query_builder.push_bind(offset);

        let data = query_builder
            .build_query_as::<Brand>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(PaginatedResponse {
            data,
            total,
            page,
            limit,
        })
    }

    /// Billing edits only affect documents generated or updated afterwards
    pub async fn update_billing(
        &self,
        actor: &Actor,
        id: Uuid,
        request: UpdateBillingRequest,
    ) -> ApiResult<Brand> {
        authorize(actor, Action::ManageBrands)?;
        request.validate()?;

        let brand = sqlx::query_as::<_, Brand>(
            r#"
            UPDATE brands
            SET legal_name = COALESCE($2, legal_name),
                address = COALESCE($3, address),
                postal_code = COALESCE($4, postal_code),
                city = COALESCE($5, city),
                country = COALESCE($6, country),
                vat_number = COALESCE($7, vat_number),
                payment_terms_days = COALESCE($8, payment_terms_days),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.legal_name)
        .bind(request.address)
        .bind(request.postal_code)
        .bind(request.city)
        .bind(request.country.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()))
        .bind(request.vat_number)
        .bind(request.payment_terms_days)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Brand {} not found", id)))?;

        tracing::info!(brand_id = %id, actor = %actor.user_id, "Brand billing updated");
        Ok(brand)
    }
}
