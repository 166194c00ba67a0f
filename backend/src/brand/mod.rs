//! Brands: the client companies documents are billed to

mod model;
mod service;

pub use model::*;
pub use service::BrandService;
