//! Shared state for the HTTP layer

mod app_state;

pub use app_state::AppState;
