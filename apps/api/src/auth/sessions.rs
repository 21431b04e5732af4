use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session store error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("session encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Server-side session record. The account itself is reloaded per request;
/// only the id is kept here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: Uuid,
    /// Which login mode the user picked.
    pub admin_mode: bool,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Stores the session and returns its bearer token.
    async fn create(&self, session: &Session) -> Result<String, SessionError>;
    async fn get(&self, token: &str) -> Result<Option<Session>, SessionError>;
    async fn revoke(&self, token: &str) -> Result<(), SessionError>;
}

pub fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}

fn session_key(token: &str) -> String {
    format!("session:{token}")
}

/// Sessions as JSON strings under `session:<token>` with a TTL.
#[derive(Clone)]
pub struct RedisSessionStore {
    client: redis::Client,
    ttl_secs: u64,
}

impl RedisSessionStore {
    pub fn new(client: redis::Client, ttl_secs: u64) -> Self {
        Self { client, ttl_secs }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn create(&self, session: &Session) -> Result<String, SessionError> {
        let token = new_token();
        let payload = serde_json::to_string(session)?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex::<_, _, ()>(session_key(&token), payload, self.ttl_secs)
            .await?;
        Ok(token)
    }

    async fn get(&self, token: &str) -> Result<Option<Session>, SessionError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload: Option<String> = conn.get(session_key(token)).await?;
        payload
            .map(|p| serde_json::from_str(&p))
            .transpose()
            .map_err(SessionError::from)
    }

    async fn revoke(&self, token: &str) -> Result<(), SessionError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del::<_, ()>(session_key(token)).await?;
        Ok(())
    }
}
