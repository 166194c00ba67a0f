//! Year-scoped sequential references for every document family

mod model;
mod service;

pub use model::*;
pub use service::{current_year, retry_on_duplicate, ReferenceGenerator};
