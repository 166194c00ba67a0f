//! Negotiation route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn negotiation_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/negotiations",
            get(list_negotiations).post(create_negotiation),
        )
        .route(
            "/api/negotiations/:id",
            get(get_negotiation)
                .put(update_negotiation)
                .delete(delete_negotiation),
        )
        .route("/api/negotiations/:id/submit", post(submit_negotiation))
        .route("/api/negotiations/:id/discuss", post(discuss_negotiation))
        .route("/api/negotiations/:id/validate", post(validate_negotiation))
        .route("/api/negotiations/:id/refuse", post(refuse_negotiation))
}
