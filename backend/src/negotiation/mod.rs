//! Negotiations: proposed deals and their review workflow

mod model;
pub mod rules;
mod service;

pub use model::*;
pub use service::NegotiationService;
