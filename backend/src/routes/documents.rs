//! Document route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn document_routes() -> Router<AppState> {
    Router::new()
        .route("/api/documents", get(list_documents).post(generate_document))
        .route(
            "/api/documents/:id",
            get(get_document).put(update_document),
        )
        .route("/api/documents/:id/send", post(send_document))
        .route("/api/documents/:id/accept", post(accept_quote))
        .route("/api/documents/:id/refuse", post(refuse_quote))
        .route("/api/documents/:id/convert", post(convert_quote))
        .route("/api/documents/:id/paid", post(mark_document_paid))
        .route(
            "/api/documents/:id/reverse-payment",
            post(reverse_document_payment),
        )
        .route(
            "/api/documents/:id/credit-notes",
            get(list_credit_notes).post(issue_credit_note),
        )
        .route("/api/documents/:id/replace", post(replace_invoice))
        .route("/api/documents/:id/events", get(list_document_events))
        .route("/api/documents/:id/render-data", get(get_render_data))
}
