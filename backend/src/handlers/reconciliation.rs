//! Bank reconciliation handlers

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use std::sync::Arc;

use crate::error::ApiError;
use crate::middleware::AuthenticatedUser;
use crate::models::{ApiResponse, PaginatedResponse};
use crate::reconciliation::{
    AssociateRequest, AssociationOutcome, BankTransaction, ListTransactionsQuery,
    ReconciliationService, SyncReport, SyncRequest, WebhookPayload,
};
use crate::state::AppState;

const WEBHOOK_SECRET_HEADER: &str = "X-Webhook-Secret";

pub async fn sync_bank_transactions(
    State(service): State<Arc<ReconciliationService>>,
    user: AuthenticatedUser,
    Json(request): Json<SyncRequest>,
) -> Result<Json<ApiResponse<SyncReport>>, ApiError> {
    let report = service.sync(&user.actor(), request).await?;
    Ok(Json(ApiResponse::ok(report)))
}

pub async fn list_unmatched_transactions(
    State(service): State<Arc<ReconciliationService>>,
    _user: AuthenticatedUser,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<BankTransaction>>>, ApiError> {
    let transactions = service.list_unmatched(query).await?;
    Ok(Json(ApiResponse::ok(transactions)))
}

pub async fn associate_transaction(
    State(service): State<Arc<ReconciliationService>>,
    user: AuthenticatedUser,
    Path(external_id): Path<String>,
    Json(request): Json<AssociateRequest>,
) -> Result<Json<ApiResponse<AssociationOutcome>>, ApiError> {
    let outcome = service
        .associate(&user.actor(), &external_id, request.document_id)
        .await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

/// Transactions pushed by the bank. Rejected unless a secret is configured
/// and matches.
pub async fn bank_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<WebhookPayload>,
) -> Result<Json<ApiResponse<SyncReport>>, ApiError> {
    match app_state.webhook_secret.as_deref() {
        Some(secret) if !secret.is_empty() => {
            let provided = headers
                .get(WEBHOOK_SECRET_HEADER)
                .and_then(|h| h.to_str().ok())
                .unwrap_or_default();

            if provided != secret {
                tracing::warn!("Bank webhook called with a wrong secret");
                return Err(ApiError::Unauthorized(
                    "Unauthorized webhook request".to_string(),
                ));
            }
        }
        _ => {
            tracing::error!("Webhook secret not configured - rejecting request");
            return Err(ApiError::Unauthorized(
                "Webhook endpoint is not configured".to_string(),
            ));
        }
    }

    let report = app_state
        .reconciliation_service
        .import(payload.transactions)
        .await?;
    tracing::info!(
        fetched = report.fetched,
        imported = report.imported,
        skipped = report.skipped,
        "Bank webhook processed"
    );
    Ok(Json(ApiResponse::ok(report)))
}
