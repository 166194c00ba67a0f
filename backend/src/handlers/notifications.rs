//! Notification inbox handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::AuthenticatedUser;
use crate::models::{ApiResponse, PaginatedResponse};
use crate::notification::{ListNotificationsQuery, Notification, Notifier};

pub async fn list_notifications(
    State(notifier): State<Notifier>,
    user: AuthenticatedUser,
    Query(query): Query<ListNotificationsQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<Notification>>>, ApiError> {
    let notifications = notifier.list_for_user(user.user_id, query).await?;
    Ok(Json(ApiResponse::ok(notifications)))
}

pub async fn mark_notification_read(
    State(notifier): State<Notifier>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Notification>>, ApiError> {
    let notification = notifier.mark_read(user.user_id, id).await?;
    Ok(Json(ApiResponse::ok(notification)))
}
