//! Shared data models for TalentDesk backend

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

/// Agency staff member. Credentials live with the identity provider; this
/// row only tells the core who can be notified and in which role.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User roles
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "user_role", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    /// Elevated administrator, the only role allowed to touch payments
    Admin,
    /// Deal reviewer
    HeadOf,
    /// Deal owner
    TalentManager,
    /// Sales reviewer
    Sales,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "ADMIN",
            UserRole::HeadOf => "HEAD_OF",
            UserRole::TalentManager => "TALENT_MANAGER",
            UserRole::Sales => "SALES",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ADMIN" => Some(UserRole::Admin),
            "HEAD_OF" => Some(UserRole::HeadOf),
            "TALENT_MANAGER" => Some(UserRole::TalentManager),
            "SALES" => Some(UserRole::Sales),
            _ => None,
        }
    }
}

/// Which side started the deal; selects the talent's commission rate
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "deal_source", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DealSource {
    Inbound,
    Outbound,
}

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Pagination parameters
#[derive(Debug, Deserialize, Default, Clone, Copy)]
pub struct PaginationParams {
    pub page: Option<i32>,
    pub limit: Option<i32>,
}

impl PaginationParams {
    /// Normalised (page, limit, offset)
    pub fn resolve(&self) -> (i32, i32, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(20).clamp(1, 100);
        let offset = (page as i64 - 1) * limit as i64;
        (page, limit, offset)
    }
}

/// Paginated response
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i32,
    pub limit: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip_through_claim_strings() {
        for role in [
            UserRole::Admin,
            UserRole::HeadOf,
            UserRole::TalentManager,
            UserRole::Sales,
        ] {
            assert_eq!(UserRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(UserRole::parse("head_of"), Some(UserRole::HeadOf));
        assert_eq!(UserRole::parse("buyer"), None);
    }

    #[test]
    fn test_pagination_defaults_and_clamping() {
        assert_eq!(PaginationParams::default().resolve(), (1, 20, 0));
        let params = PaginationParams {
            page: Some(3),
            limit: Some(500),
        };
        assert_eq!(params.resolve(), (3, 100, 200));
        let params = PaginationParams {
            page: Some(-2),
            limit: Some(0),
        };
        assert_eq!(params.resolve(), (1, 1, 0));
    }
}
