//! Collaborations: won deals and their delivery and payment lifecycle

mod model;
pub mod rules;
mod service;
pub(crate) mod store;

pub use model::*;
pub use service::CollaborationService;
