//! Role gate wrapped around every business route group.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use crate::commands::auth;
use crate::error::{AppError, AppResult};
use crate::models::UserRole;
use crate::routes::AppState;

pub const ADMIN: &[UserRole] = &[UserRole::Admin];
pub const FRONT_OF_HOUSE: &[UserRole] = &[UserRole::Admin, UserRole::Cashier, UserRole::Waiter];
pub const ALL_ROLES: &[UserRole] = UserRole::ALL;

/// Middleware state: the shared application state plus the roles a route group admits.
#[derive(Clone)]
pub struct RoleGate {
    state: AppState,
    allowed: &'static [UserRole],
}

impl RoleGate {
    pub fn new(state: AppState, allowed: &'static [UserRole]) -> Self {
        Self { state, allowed }
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> AppResult<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing or invalid Authorization header".to_string()))
}

/// Resolves the caller and inserts their `User` into request extensions.
pub async fn require_roles(
    State(gate): State<RoleGate>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers())?;
    let user = auth::authorize(&gate.state.db, &gate.state.tokens, token, gate.allowed)?;

    tracing::debug!(username = %user.username, path = %req.uri().path(), "request authorized");
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
