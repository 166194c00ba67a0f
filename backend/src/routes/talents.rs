//! Talent and brand route definitions

use axum::{
    routing::{get, put},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn talent_routes() -> Router<AppState> {
    Router::new()
        .route("/api/talents", get(list_talents).post(create_talent))
        .route("/api/talents/:id", get(get_talent))
        .route("/api/talents/:id/commissions", put(update_talent_commissions))
}

pub fn brand_routes() -> Router<AppState> {
    Router::new()
        .route("/api/brands", get(list_brands).post(create_brand))
        .route("/api/brands/:id", get(get_brand))
        .route("/api/brands/:id/billing", put(update_brand_billing))
}
