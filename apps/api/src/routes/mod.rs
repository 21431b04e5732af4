pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post},
    Router,
};

use crate::auth::handlers as auth;
use crate::reports::handlers as reports;
use crate::state::AppState;
use crate::users::handlers as users;

pub fn build_router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.config.max_upload_bytes);

    Router::new()
        .route("/health", get(health::health_handler))
        // Identity
        .route("/api/v1/auth/login", post(auth::handle_login))
        .route("/api/v1/auth/logout", post(auth::handle_logout))
        .route("/api/v1/auth/profile", post(auth::handle_complete_profile))
        // Reports
        .route("/api/v1/criteria", get(reports::handle_list_criteria))
        .route(
            "/api/v1/reports",
            get(reports::handle_list_reports).post(reports::handle_generate_report),
        )
        .route(
            "/api/v1/reports/:id/document",
            get(reports::handle_download_report),
        )
        .route("/api/v1/reports/:id", delete(reports::handle_delete_report))
        // User management (admin)
        .route(
            "/api/v1/users",
            get(users::handle_list_users).post(users::handle_invite_user),
        )
        .route("/api/v1/users/:id/admin", patch(users::handle_set_admin))
        .route("/api/v1/users/:id/disabled", patch(users::handle_set_disabled))
        .route("/api/v1/users/:id", delete(users::handle_delete_user))
        .layer(body_limit)
        .with_state(state)
}
