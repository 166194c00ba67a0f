//! Talents: the people whose deals the agency negotiates

mod model;
mod service;

pub use model::*;
pub use service::TalentService;
