//! Session bindings for Redis.
//!
//! The OAuth flow lives outside the core; once the identity provider has
//! vouched for a user, the glue layer stores a `session:{token} → Session`
//! binding here and sets the token as a cookie. Request handling only ever
//! reads and deletes these bindings.

use anyhow::Result;
use async_trait::async_trait;
use redis::AsyncCommands;

use crate::models::Session;

/// Store for session-token to user bindings.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Health check - verify Redis connectivity.
    async fn health_check(&self) -> Result<bool>;

    /// Look up the session bound to a token.
    async fn get(&self, token: &str) -> Result<Option<Session>>;

    /// Bind a token to a session with TTL.
    async fn put(&self, token: &str, session: &Session, ttl_secs: u64) -> Result<()>;

    /// Remove a binding (returns true if it existed).
    async fn delete(&self, token: &str) -> Result<bool>;
}

/// Redis implementation of SessionStore.
#[derive(Clone)]
pub struct RedisSessionStore {
    client: redis::Client,
}

impl RedisSessionStore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    fn session_key(token: &str) -> String {
        format!("session:{}", token)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn health_check(&self) -> Result<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let result: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(result == "PONG")
    }

    async fn get(&self, token: &str) -> Result<Option<Session>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let json: Option<String> = conn.get(Self::session_key(token)).await?;

        match json {
            Some(j) => Ok(Some(serde_json::from_str(&j)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, token: &str, session: &Session, ttl_secs: u64) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = Self::session_key(token);
        let json = serde_json::to_string(session)?;

        let _: () = conn.set(&key, &json).await?;
        let _: () = conn.expire(&key, ttl_secs as i64).await?;

        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let deleted: i64 = conn.del(Self::session_key(token)).await?;
        Ok(deleted > 0)
    }
}
