//! Brand handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::brand::{Brand, BrandService, CreateBrandRequest, ListBrandsQuery, UpdateBillingRequest};
use crate::error::ApiError;
use crate::middleware::AuthenticatedUser;
use crate::models::{ApiResponse, PaginatedResponse};

pub async fn create_brand(
    State(service): State<Arc<BrandService>>,
    user: AuthenticatedUser,
    Json(request): Json<CreateBrandRequest>,
) -> Result<Json<ApiResponse<Brand>>, ApiError> {
    let brand = service.create(&user.actor(), request).await?;
    Ok(Json(ApiResponse::ok(brand)))
}

pub async fn get_brand(
    State(service): State<Arc<BrandService>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Brand>>, ApiError> {
    let brand = service.get(id).await?;
    Ok(Json(ApiResponse::ok(brand)))
}

pub async fn list_brands(
    State(service): State<Arc<BrandService>>,
    _user: AuthenticatedUser,
    Query(query): Query<ListBrandsQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<Brand>>>, ApiError> {
    let brands = service.list(query).await?;
    Ok(Json(ApiResponse::ok(brands)))
}

pub async fn update_brand_billing(
    State(service): State<Arc<BrandService>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateBillingRequest>,
) -> Result<Json<ApiResponse<Brand>>, ApiError> {
    let brand = service.update_billing(&user.actor(), id, request).await?;
    Ok(Json(ApiResponse::ok(brand)))
}
