//! Middleware for TalentDesk API
//!
//! This module provides middleware for request tracing, rate limiting,
//! security headers, and authentication.

pub mod auth;
mod rate_limiter;
mod security;
mod tracing;

pub use auth::AuthenticatedUser;
pub use rate_limiter::{rate_limit_layer, RateLimiter};
pub use security::security_headers;
pub use self::tracing::request_tracing;
