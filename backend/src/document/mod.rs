//! Commercial documents: quotes, invoices, credit notes and purchase orders

pub mod credit;
mod model;
pub mod render;
pub mod rules;
mod service;
pub(crate) mod store;

pub use model::*;
pub use render::{
    DocumentRenderData, HttpPdfRenderer, JsonSnapshotRenderer, PdfRenderer, RenderedDocument,
};
pub use service::DocumentService;
pub(crate) use service::{collaboration_manager, invoice_paid_notification};
