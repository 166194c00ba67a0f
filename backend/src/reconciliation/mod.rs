//! Reconciliation between bank credits and invoices

mod feed;
mod model;
mod service;

pub use feed::{BankFeed, HttpBankFeed};
pub use model::*;
pub use service::ReconciliationService;
