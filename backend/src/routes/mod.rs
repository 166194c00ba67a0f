//! Route definitions for TalentDesk API

mod collaborations;
mod documents;
mod negotiations;
mod reconciliation;
mod talents;

use axum::{routing::get, Router};

use crate::handlers::{health_check, root};
use crate::state::AppState;
use crate::websocket;

pub use collaborations::collaboration_routes;
pub use documents::document_routes;
pub use negotiations::negotiation_routes;
pub use reconciliation::{notification_routes, reconciliation_routes};
pub use talents::{brand_routes, talent_routes};

/// Every route of the API, without the middleware stack
pub fn api_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/ws", get(websocket::ws_handler))
        .merge(talent_routes())
        .merge(brand_routes())
        .merge(negotiation_routes())
        .merge(collaboration_routes())
        .merge(document_routes())
        .merge(reconciliation_routes())
        .merge(notification_routes())
        .with_state(app_state)
}
