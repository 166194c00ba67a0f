//! Caller identity and authorization
//!
//! - Bearer token verification (tokens are issued by the identity provider)
//! - Closed role set and the transition permission matrix

mod jwt;
mod permissions;

pub use jwt::{issue_token, verify_token, Claims, JwtError, TokenVerifier};
pub use permissions::{authorize, authorize_owner, Action, Actor};
