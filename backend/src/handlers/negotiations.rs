//! Negotiation handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::AuthenticatedUser;
use crate::models::{ApiResponse, PaginatedResponse};
use crate::negotiation::{
    CreateNegotiationRequest, ListNegotiationsQuery, Negotiation, NegotiationDetail,
    NegotiationService, RefuseNegotiationRequest, UpdateNegotiationRequest, ValidationOutcome,
};

pub async fn create_negotiation(
    State(service): State<Arc<NegotiationService>>,
    user: AuthenticatedUser,
    Json(request): Json<CreateNegotiationRequest>,
) -> Result<Json<ApiResponse<NegotiationDetail>>, ApiError> {
    let negotiation = service.create(&user.actor(), request).await?;
    Ok(Json(ApiResponse::ok(negotiation)))
}

pub async fn get_negotiation(
    State(service): State<Arc<NegotiationService>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<NegotiationDetail>>, ApiError> {
    let negotiation = service.get(id).await?;
    Ok(Json(ApiResponse::ok(negotiation)))
}

pub async fn list_negotiations(
    State(service): State<Arc<NegotiationService>>,
    _user: AuthenticatedUser,
    Query(query): Query<ListNegotiationsQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<Negotiation>>>, ApiError> {
    let negotiations = service.list(query).await?;
    Ok(Json(ApiResponse::ok(negotiations)))
}

pub async fn update_negotiation(
    State(service): State<Arc<NegotiationService>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateNegotiationRequest>,
) -> Result<Json<ApiResponse<NegotiationDetail>>, ApiError> {
    let negotiation = service.update(&user.actor(), id, request).await?;
    Ok(Json(ApiResponse::ok(negotiation)))
}

pub async fn submit_negotiation(
    State(service): State<Arc<NegotiationService>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Negotiation>>, ApiError> {
    let negotiation = service.submit(&user.actor(), id).await?;
    Ok(Json(ApiResponse::ok(negotiation)))
}

pub async fn discuss_negotiation(
    State(service): State<Arc<NegotiationService>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Negotiation>>, ApiError> {
    let negotiation = service.start_discussion(&user.actor(), id).await?;
    Ok(Json(ApiResponse::ok(negotiation)))
}

/// Validation creates the collaboration in the same transaction
pub async fn validate_negotiation(
    State(service): State<Arc<NegotiationService>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ValidationOutcome>>, ApiError> {
    let outcome = service.validate(&user.actor(), id).await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

pub async fn refuse_negotiation(
    State(service): State<Arc<NegotiationService>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<RefuseNegotiationRequest>,
) -> Result<Json<ApiResponse<Negotiation>>, ApiError> {
    let negotiation = service.refuse(&user.actor(), id, request.reason).await?;
    Ok(Json(ApiResponse::ok(negotiation)))
}

pub async fn delete_negotiation(
    State(service): State<Arc<NegotiationService>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    service.delete(&user.actor(), id).await?;
    Ok(Json(ApiResponse::ok(())))
}
