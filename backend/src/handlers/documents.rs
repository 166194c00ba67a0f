//! Document handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::document::{
    CreditNoteOutcome, CreditNoteRequest, Document, DocumentDetail, DocumentEvent,
    DocumentRenderData, DocumentService, GenerateDocumentRequest, ListDocumentsQuery,
    MarkPaidRequest, RefuseQuoteRequest, ReplaceInvoiceRequest, ReplacementOutcome,
    ReversePaymentRequest, UpdateDocumentRequest,
};
use crate::error::ApiError;
use crate::middleware::AuthenticatedUser;
use crate::models::{ApiResponse, PaginatedResponse};

pub async fn generate_document(
    State(service): State<Arc<DocumentService>>,
    user: AuthenticatedUser,
    Json(request): Json<GenerateDocumentRequest>,
) -> Result<Json<ApiResponse<DocumentDetail>>, ApiError> {
    let document = service.generate(&user.actor(), request).await?;
    Ok(Json(ApiResponse::ok(document)))
}

pub async fn get_document(
    State(service): State<Arc<DocumentService>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<DocumentDetail>>, ApiError> {
    let document = service.get(id).await?;
    Ok(Json(ApiResponse::ok(document)))
}

pub async fn list_documents(
    State(service): State<Arc<DocumentService>>,
    _user: AuthenticatedUser,
    Query(query): Query<ListDocumentsQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<Document>>>, ApiError> {
    let documents = service.list(query).await?;
    Ok(Json(ApiResponse::ok(documents)))
}

pub async fn update_document(
    State(service): State<Arc<DocumentService>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateDocumentRequest>,
) -> Result<Json<ApiResponse<DocumentDetail>>, ApiError> {
    let document = service.update(&user.actor(), id, request).await?;
    Ok(Json(ApiResponse::ok(document)))
}

pub async fn send_document(
    State(service): State<Arc<DocumentService>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Document>>, ApiError> {
    let document = service.send(&user.actor(), id).await?;
    Ok(Json(ApiResponse::ok(document)))
}

pub async fn accept_quote(
    State(service): State<Arc<DocumentService>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Document>>, ApiError> {
    let document = service.accept(&user.actor(), id).await?;
    Ok(Json(ApiResponse::ok(document)))
}

pub async fn refuse_quote(
    State(service): State<Arc<DocumentService>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<RefuseQuoteRequest>,
) -> Result<Json<ApiResponse<Document>>, ApiError> {
    let document = service.refuse(&user.actor(), id, request).await?;
    Ok(Json(ApiResponse::ok(document)))
}

pub async fn convert_quote(
    State(service): State<Arc<DocumentService>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<DocumentDetail>>, ApiError> {
    let invoice = service.convert_to_invoice(&user.actor(), id).await?;
    Ok(Json(ApiResponse::ok(invoice)))
}

pub async fn mark_document_paid(
    State(service): State<Arc<DocumentService>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<MarkPaidRequest>,
) -> Result<Json<ApiResponse<Document>>, ApiError> {
    let document = service.mark_paid(&user.actor(), id, request).await?;
    Ok(Json(ApiResponse::ok(document)))
}

pub async fn reverse_document_payment(
    State(service): State<Arc<DocumentService>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<ReversePaymentRequest>,
) -> Result<Json<ApiResponse<Document>>, ApiError> {
    let document = service.reverse_payment(&user.actor(), id, request).await?;
    Ok(Json(ApiResponse::ok(document)))
}

pub async fn issue_credit_note(
    State(service): State<Arc<DocumentService>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<CreditNoteRequest>,
) -> Result<Json<ApiResponse<CreditNoteOutcome>>, ApiError> {
    let outcome = service.issue_credit_note(&user.actor(), id, request).await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

pub async fn replace_invoice(
    State(service): State<Arc<DocumentService>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<ReplaceInvoiceRequest>,
) -> Result<Json<ApiResponse<ReplacementOutcome>>, ApiError> {
    let outcome = service.replace_invoice(&user.actor(), id, request).await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

pub async fn list_credit_notes(
    State(service): State<Arc<DocumentService>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<Document>>>, ApiError> {
    let notes = service.credit_notes(id).await?;
    Ok(Json(ApiResponse::ok(notes)))
}

pub async fn list_document_events(
    State(service): State<Arc<DocumentService>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<DocumentEvent>>>, ApiError> {
    let events = service.events(id).await?;
    Ok(Json(ApiResponse::ok(events)))
}

pub async fn get_render_data(
    State(service): State<Arc<DocumentService>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<DocumentRenderData>>, ApiError> {
    let data = service.render_data(id).await?;
    Ok(Json(ApiResponse::ok(data)))
}
