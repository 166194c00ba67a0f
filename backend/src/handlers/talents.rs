//! Talent handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::AuthenticatedUser;
use crate::models::{ApiResponse, PaginatedResponse};
use crate::talent::{
    CreateTalentRequest, ListTalentsQuery, Talent, TalentService, UpdateCommissionRequest,
};

pub async fn create_talent(
    State(service): State<Arc<TalentService>>,
    user: AuthenticatedUser,
    Json(request): Json<CreateTalentRequest>,
) -> Result<Json<ApiResponse<Talent>>, ApiError> {
    let talent = service.create(&user.actor(), request).await?;
    Ok(Json(ApiResponse::ok(talent)))
}

pub async fn get_talent(
    State(service): State<Arc<TalentService>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Talent>>, ApiError> {
    let talent = service.get(id).await?;
    Ok(Json(ApiResponse::ok(talent)))
}

pub async fn list_talents(
    State(service): State<Arc<TalentService>>,
    _user: AuthenticatedUser,
    Query(query): Query<ListTalentsQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<Talent>>>, ApiError> {
    let talents = service.list(query).await?;
    Ok(Json(ApiResponse::ok(talents)))
}

pub async fn update_talent_commissions(
    State(service): State<Arc<TalentService>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateCommissionRequest>,
) -> Result<Json<ApiResponse<Talent>>, ApiError> {
    let talent = service.update_commissions(&user.actor(), id, request).await?;
    Ok(Json(ApiResponse::ok(talent)))
}
