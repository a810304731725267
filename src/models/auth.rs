//! API token model for authentication.
//!
//! Tokens are stored as SHA-256 hashes. Each token belongs to a user and
//! carries a role; the admin role unlocks the `/admin` routes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

/// Represents an API token record from the database.
///
/// # Database Table
///
/// Maps to `api_tokens`. Inactive tokens are rejected during authentication,
/// which revokes access without deleting the row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiToken {
    pub id: Uuid,
    pub user_id: Uuid,

    /// SHA-256 hash of the bearer token (64 hex characters)
    pub token_hash: String,

    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
