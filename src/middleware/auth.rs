//! Bearer token authentication and the admin guard.
//!
//! This middleware intercepts every protected request to:
//! 1. Extract the token from the Authorization header
//! 2. Hash it and look up an active token row
//! 3. Inject the caller's user id and role into the request
//! 4. Reject unknown or revoked tokens with HTTP 401

use crate::{
    db::DbPool,
    error::AppError,
    models::auth::{ApiToken, Role},
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Who is calling. Inserted into request extensions by [`auth_middleware`].
#[derive(Debug, Clone, Copy)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// SHA-256 of a bearer token, hex encoded, as stored in `api_tokens.token_hash`.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Token authentication middleware function.
///
/// # Headers
///
/// ```text
/// Authorization: Bearer abc123xyz
/// ```
///
/// # Returns
///
/// - `Ok(Response)` if authenticated (calls the next handler)
/// - `Err(AppError::Unauthorized)` if the header is missing or the token is unknown
pub async fn auth_middleware(
    State(pool): State<DbPool>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    let token_hash = hash_token(token);

    let record = sqlx::query_as::<_, ApiToken>(
        "SELECT id, user_id, token_hash, role, is_active, created_at
         FROM api_tokens
         WHERE token_hash = $1 AND is_active = true",
    )
    .bind(&token_hash)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::Unauthorized)?;

    request.extensions_mut().insert(AuthContext {
        user_id: record.user_id,
        role: record.role,
    });

    Ok(next.run(request).await)
}

/// Rejects callers without the admin role (403). Must run after [`auth_middleware`].
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    match request.extensions().get::<AuthContext>() {
        Some(auth) if auth.is_admin() => Ok(next.run(request).await),
        Some(auth) => {
            tracing::warn!(user_id = %auth.user_id, path = %request.uri().path(), "Admin route denied");
            Err(AppError::NotOwner)
        }
        None => Err(AppError::Unauthorized),
    }
}
