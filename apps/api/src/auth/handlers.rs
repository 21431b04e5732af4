use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::context::SessionContext;
use crate::auth::identity::UserRow;
use crate::auth::passwords::{hash_password, validate_new_password, verify_password};
use crate::auth::sessions::Session;
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// Login mode chosen by the user; an admin login on a non-admin account is refused.
    #[serde(default)]
    pub as_admin: bool,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserRow,
    pub needs_profile_setup: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

/// POST /api/v1/auth/login
pub async fn handle_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let invalid = || AppError::Unauthorized("Invalid credentials".to_string());

    let user = state
        .identity
        .find_by_email(&req.email)
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&req.password, &user.password_hash).await? {
        return Err(invalid());
    }
    if user.disabled {
        return Err(AppError::Forbidden(
            "This account has been disabled".to_string(),
        ));
    }
    if req.as_admin && !user.is_admin {
        return Err(AppError::Forbidden(
            "This account does not have admin privileges".to_string(),
        ));
    }

    let notice = (!req.as_admin && user.is_admin).then(|| {
        "You logged in as a User, but this account has admin privileges. \
         You can log in as Admin to access more features."
            .to_string()
    });

    let token = state
        .sessions
        .create(&Session {
            user_id: user.id,
            admin_mode: req.as_admin,
            created_at: Utc::now(),
        })
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    info!("User {} logged in", user.email);

    Ok(Json(LoginResponse {
        token,
        needs_profile_setup: !user.has_set_profile,
        user,
        notice,
    }))
}

/// POST /api/v1/auth/logout
pub async fn handle_logout(
    State(state): State<AppState>,
    ctx: SessionContext,
) -> Result<StatusCode, AppError> {
    state
        .sessions
        .revoke(&ctx.token)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ProfileRequest {
    pub display_name: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub message: String,
}

/// POST /api/v1/auth/profile
///
/// Sets display name and password, then ends the session so the user logs in
/// again with the new password.
pub async fn handle_complete_profile(
    State(state): State<AppState>,
    ctx: SessionContext,
    Json(req): Json<ProfileRequest>,
) -> Result<Json<ProfileResponse>, AppError> {
    let display_name = req.display_name.trim();
    if display_name.is_empty() {
        return Err(AppError::Validation(
            "Display Name cannot be empty.".to_string(),
        ));
    }
    if req.new_password != req.confirm_password {
        return Err(AppError::Validation("Passwords do not match.".to_string()));
    }
    validate_new_password(&req.new_password)?;

    let password_hash = hash_password(&req.new_password).await?;
    if !state
        .identity
        .complete_profile(ctx.user.id, display_name, &password_hash)
        .await?
    {
        return Err(AppError::NotFound("Account not found".to_string()));
    }

    state
        .sessions
        .revoke(&ctx.token)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    info!("User {} completed profile setup", ctx.user.email);

    Ok(Json(ProfileResponse {
        message: "Profile updated successfully! Please log in again with your new password."
            .to_string(),
    }))
}
