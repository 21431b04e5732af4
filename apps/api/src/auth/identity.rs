use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::auth::passwords::{hash_password, validate_new_password};
use crate::config::BootstrapAdmin;
use crate::errors::AppError;
use crate::screening::models::Author;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_admin: bool,
    pub disabled: bool,
    pub has_set_profile: bool,
    pub created_at: DateTime<Utc>,
}

impl UserRow {
    pub fn author(&self) -> Author {
        Author {
            email: self.email.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
}

/// Emails are matched case-insensitively and stored trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Account store. Mutators return false when no account had the given id.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRow>, sqlx::Error>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRow>, sqlx::Error>;
    async fn list(&self) -> Result<Vec<UserRow>, sqlx::Error>;
    async fn create(&self, user: NewUser) -> Result<UserRow, sqlx::Error>;
    async fn complete_profile(
        &self,
        id: Uuid,
        display_name: &str,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error>;
    async fn set_admin(&self, id: Uuid, is_admin: bool) -> Result<bool, sqlx::Error>;
    async fn set_disabled(&self, id: Uuid, disabled: bool) -> Result<bool, sqlx::Error>;
    async fn delete(&self, id: Uuid) -> Result<bool, sqlx::Error>;
}

#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRow>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM users WHERE email = $1")
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRow>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn list(&self) -> Result<Vec<UserRow>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM users ORDER BY email")
            .fetch_all(&self.pool)
            .await
    }

    async fn create(&self, user: NewUser) -> Result<UserRow, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO users (id, email, password_hash, is_admin)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(normalize_email(&user.email))
        .bind(&user.password_hash)
        .bind(user.is_admin)
        .fetch_one(&self.pool)
        .await
    }

    async fn complete_profile(
        &self,
        id: Uuid,
        display_name: &str,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET display_name = $2, password_hash = $3, has_set_profile = TRUE
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(display_name)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_admin(&self, id: Uuid, is_admin: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET is_admin = $2 WHERE id = $1")
            .bind(id)
            .bind(is_admin)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_disabled(&self, id: Uuid, disabled: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET disabled = $2 WHERE id = $1")
            .bind(id)
            .bind(disabled)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Maps a unique-key violation on insert to a 409.
pub fn conflict_on_duplicate(error: sqlx::Error) -> AppError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict(
            "The email address is already in use by another account.".to_string(),
        ),
        _ => AppError::Database(error),
    }
}

/// Creates the configured first administrator unless that email already exists.
pub async fn ensure_bootstrap_admin(
    identity: &dyn IdentityStore,
    admin: &BootstrapAdmin,
) -> Result<(), AppError> {
    if identity.find_by_email(&admin.email).await?.is_some() {
        return Ok(());
    }
    validate_new_password(&admin.password)?;
    let password_hash = hash_password(&admin.password).await?;
    let user = identity
        .create(NewUser {
            email: admin.email.clone(),
            password_hash,
            is_admin: true,
        })
        .await
        .map_err(conflict_on_duplicate)?;
    info!("Bootstrap admin {} created", user.email);
    Ok(())
}
