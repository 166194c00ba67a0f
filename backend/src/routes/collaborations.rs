//! Collaboration route definitions

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn collaboration_routes() -> Router<AppState> {
    Router::new()
        .route("/api/collaborations", get(list_collaborations))
        .route("/api/collaborations/:id", get(get_collaboration))
        .route("/api/collaborations/:id/start", post(start_collaboration))
        .route("/api/collaborations/:id/publish", post(publish_collaboration))
        .route(
            "/api/collaborations/:id/talent-invoice",
            post(record_talent_invoice),
        )
        .route(
            "/api/collaborations/:id/talent-invoice/validate",
            post(validate_talent_invoice),
        )
        .route("/api/collaborations/:id/talent-paid", post(mark_talent_paid))
        .route("/api/collaborations/:id/lost", post(mark_collaboration_lost))
        .route(
            "/api/collaborations/:id/amount",
            put(update_collaboration_amount),
        )
}
