use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;

use crate::auth::identity::UserRow;
use crate::errors::AppError;
use crate::screening::models::Author;
use crate::state::AppState;

/// Immutable per-request view of the signed-in account.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub token: String,
    pub user: UserRow,
    pub admin_mode: bool,
}

impl SessionContext {
    /// Admin view: an admin account that signed in in admin mode. The flag is
    /// read from the account on every request, so a revoked privilege applies
    /// immediately.
    pub fn is_admin(&self) -> bool {
        self.admin_mode && self.user.is_admin
    }

    pub fn author(&self) -> Author {
        self.user.author()
    }
}

/// A `SessionContext` in the admin view.
#[derive(Debug, Clone)]
pub struct AdminContext(pub SessionContext);

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[axum::async_trait]
impl FromRequestParts<AppState> for SessionContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?
            .to_string();

        let session = state
            .sessions
            .get(&token)
            .await
            .map_err(|e| AppError::Internal(e.into()))?
            .ok_or_else(|| AppError::Unauthorized("Session expired or invalid".to_string()))?;

        match state.identity.find_by_id(session.user_id).await? {
            Some(user) if !user.disabled => Ok(SessionContext {
                token,
                user,
                admin_mode: session.admin_mode,
            }),
            _ => {
                if let Err(e) = state.sessions.revoke(&token).await {
                    warn!("Could not revoke stale session: {e}");
                }
                Err(AppError::Unauthorized(
                    "This account is disabled or no longer exists".to_string(),
                ))
            }
        }
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let ctx = SessionContext::from_request_parts(parts, state).await?;
        if !ctx.is_admin() {
            return Err(AppError::Forbidden(
                "Admin privileges are required".to_string(),
            ));
        }
        Ok(AdminContext(ctx))
    }
}
