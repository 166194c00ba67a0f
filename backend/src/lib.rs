//! TalentDesk Backend Library
//!
//! Deal flow of a talent agency: negotiations, collaborations, quotes,
//! invoices and credit notes, and bank reconciliation.

pub mod auth;
pub mod brand;
pub mod collaboration;
pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod negotiation;
pub mod notification;
pub mod pricing;
pub mod reconciliation;
pub mod reference;
pub mod routes;
pub mod state;
pub mod storage;
pub mod talent;
pub mod vat;
pub mod websocket;
