//! API handlers for TalentDesk backend

mod brands;
mod collaborations;
mod documents;
mod health;
mod negotiations;
mod notifications;
mod reconciliation;
mod talents;

pub use brands::*;
pub use collaborations::*;
pub use documents::*;
pub use health::{health_check, root};
pub use negotiations::*;
pub use notifications::*;
pub use reconciliation::*;
pub use talents::*;

pub use crate::middleware::AuthenticatedUser;
