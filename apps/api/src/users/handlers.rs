use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::context::AdminContext;
use crate::auth::identity::{conflict_on_duplicate, normalize_email, NewUser, UserRow};
use crate::auth::passwords::{hash_password, validate_new_password};
use crate::errors::AppError;
use crate::state::AppState;

fn not_self(ctx: &AdminContext, id: Uuid) -> Result<(), AppError> {
    if ctx.0.user.id == id {
        return Err(AppError::Validation(
            "You cannot change your own account from user management".to_string(),
        ));
    }
    Ok(())
}

async fn reload(state: &AppState, id: Uuid) -> Result<UserRow, AppError> {
    state
        .identity
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {id} not found")))
}

/// GET /api/v1/users
pub async fn handle_list_users(
    State(state): State<AppState>,
    ctx: AdminContext,
) -> Result<Json<Vec<UserRow>>, AppError> {
    let users = state
        .identity
        .list()
        .await?
        .into_iter()
        .filter(|u| u.id != ctx.0.user.id)
        .collect();
    Ok(Json(users))
}

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub email: String,
    /// Temporary password; the invitee replaces it during profile setup.
    pub password: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub confirm_admin: bool,
}

/// POST /api/v1/users
pub async fn handle_invite_user(
    State(state): State<AppState>,
    ctx: AdminContext,
    Json(req): Json<InviteRequest>,
) -> Result<(StatusCode, Json<UserRow>), AppError> {
    let email = normalize_email(&req.email);
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::Validation(
            "A valid email address is required".to_string(),
        ));
    }
    validate_new_password(&req.password)?;
    if req.is_admin && !req.confirm_admin {
        return Err(AppError::Validation(
            "Granting admin privileges must be confirmed".to_string(),
        ));
    }
    if state.identity.find_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict(
            "The email address is already in use by another account.".to_string(),
        ));
    }

    let password_hash = hash_password(&req.password).await?;
    let user = state
        .identity
        .create(NewUser {
            email,
            password_hash,
            is_admin: req.is_admin,
        })
        .await
        .map_err(conflict_on_duplicate)?;

    info!(
        "User {} created by {} (admin: {})",
        user.email, ctx.0.user.email, user.is_admin
    );
    Ok((StatusCode::CREATED, Json(user)))
}

#[derive(Debug, Deserialize)]
pub struct AdminFlag {
    pub is_admin: bool,
}

/// PATCH /api/v1/users/:id/admin
pub async fn handle_set_admin(
    State(state): State<AppState>,
    ctx: AdminContext,
    Path(id): Path<Uuid>,
    Json(req): Json<AdminFlag>,
) -> Result<Json<UserRow>, AppError> {
    not_self(&ctx, id)?;
    if !state.identity.set_admin(id, req.is_admin).await? {
        return Err(AppError::NotFound(format!("User {id} not found")));
    }
    info!("User {id} admin flag set to {}", req.is_admin);
    Ok(Json(reload(&state, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct DisabledFlag {
    pub disabled: bool,
}

/// PATCH /api/v1/users/:id/disabled
///
/// Existing sessions of a disabled account stop working on their next request.
pub async fn handle_set_disabled(
    State(state): State<AppState>,
    ctx: AdminContext,
    Path(id): Path<Uuid>,
    Json(req): Json<DisabledFlag>,
) -> Result<Json<UserRow>, AppError> {
    not_self(&ctx, id)?;
    if !state.identity.set_disabled(id, req.disabled).await? {
        return Err(AppError::NotFound(format!("User {id} not found")));
    }
    info!("User {id} disabled flag set to {}", req.disabled);
    Ok(Json(reload(&state, id).await?))
}

/// DELETE /api/v1/users/:id
pub async fn handle_delete_user(
    State(state): State<AppState>,
    ctx: AdminContext,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    not_self(&ctx, id)?;
    if !state.identity.delete(id).await? {
        return Err(AppError::NotFound(format!("User {id} not found")));
    }
    info!("User {id} deleted by {}", ctx.0.user.email);
    Ok(StatusCode::NO_CONTENT)
}
