//! Collaboration handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::collaboration::{
    Collaboration, CollaborationDetail, CollaborationService, ListCollaborationsQuery,
    MarkLostRequest, MarkPublishedRequest, TalentInvoiceRequest, UpdateAmountRequest,
};
use crate::error::ApiError;
use crate::middleware::AuthenticatedUser;
use crate::models::{ApiResponse, PaginatedResponse};

pub async fn get_collaboration(
    State(service): State<Arc<CollaborationService>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CollaborationDetail>>, ApiError> {
    let collaboration = service.get(id).await?;
    Ok(Json(ApiResponse::ok(collaboration)))
}

pub async fn list_collaborations(
    State(service): State<Arc<CollaborationService>>,
    _user: AuthenticatedUser,
    Query(query): Query<ListCollaborationsQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<Collaboration>>>, ApiError> {
    let collaborations = service.list(query).await?;
    Ok(Json(ApiResponse::ok(collaborations)))
}

pub async fn start_collaboration(
    State(service): State<Arc<CollaborationService>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Collaboration>>, ApiError> {
    let collaboration = service.start_production(&user.actor(), id).await?;
    Ok(Json(ApiResponse::ok(collaboration)))
}

pub async fn publish_collaboration(
    State(service): State<Arc<CollaborationService>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<MarkPublishedRequest>,
) -> Result<Json<ApiResponse<Collaboration>>, ApiError> {
    let collaboration = service
        .mark_published(&user.actor(), id, request.publication_date)
        .await?;
    Ok(Json(ApiResponse::ok(collaboration)))
}

pub async fn record_talent_invoice(
    State(service): State<Arc<CollaborationService>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<TalentInvoiceRequest>,
) -> Result<Json<ApiResponse<Collaboration>>, ApiError> {
    let collaboration = service
        .record_talent_invoice(&user.actor(), id, &request.url)
        .await?;
    Ok(Json(ApiResponse::ok(collaboration)))
}

pub async fn validate_talent_invoice(
    State(service): State<Arc<CollaborationService>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Collaboration>>, ApiError> {
    let collaboration = service.validate_talent_invoice(&user.actor(), id).await?;
    Ok(Json(ApiResponse::ok(collaboration)))
}

pub async fn mark_talent_paid(
    State(service): State<Arc<CollaborationService>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Collaboration>>, ApiError> {
    let collaboration = service.mark_talent_paid(&user.actor(), id).await?;
    Ok(Json(ApiResponse::ok(collaboration)))
}

pub async fn mark_collaboration_lost(
    State(service): State<Arc<CollaborationService>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<MarkLostRequest>,
) -> Result<Json<ApiResponse<Collaboration>>, ApiError> {
    let collaboration = service.mark_lost(&user.actor(), id, &request.reason).await?;
    Ok(Json(ApiResponse::ok(collaboration)))
}

pub async fn update_collaboration_amount(
    State(service): State<Arc<CollaborationService>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateAmountRequest>,
) -> Result<Json<ApiResponse<Collaboration>>, ApiError> {
    let collaboration = service
        .update_amount(&user.actor(), id, request.gross_amount)
        .await?;
    Ok(Json(ApiResponse::ok(collaboration)))
}
