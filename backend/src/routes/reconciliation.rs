//! Reconciliation and notification route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn reconciliation_routes() -> Router<AppState> {
    Router::new()
        .route("/api/bank-transactions/sync", post(sync_bank_transactions))
        .route(
            "/api/bank-transactions/unmatched",
            get(list_unmatched_transactions),
        )
        .route(
            "/api/bank-transactions/:external_id/associate",
            post(associate_transaction),
        )
        .route("/api/bank-transactions/webhook", post(bank_webhook))
}

pub fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/:id/read", post(mark_notification_read))
}
