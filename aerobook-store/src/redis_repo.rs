use aerobook_core::{OfferBinding, SessionStore, StoreError};
use async_trait::async_trait;
use redis::{AsyncCommands, RedisResult};
use tracing::{debug, info};
use uuid::Uuid;

const TOKEN_FIELD: &str = "token";

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    pub async fn hget_field(&self, key: &str, field: &str) -> RedisResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.hget(key, field).await
    }

    /// Writes all fields and refreshes the TTL in one transaction.
    pub async fn hset_fields(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl_seconds: u64,
    ) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::pipe()
            .atomic()
            .hset_multiple(key, fields)
            .ignore()
            .expire(key, ttl_seconds as i64)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
    }

    pub async fn ping(&self) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await
    }
}

/// Session state kept in one Redis hash per workflow:
/// `token`, and `leg:{i}:token` / `leg:{i}:handle` per leg.
#[derive(Clone)]
pub struct RedisSessionStore {
    redis: RedisClient,
    ttl_seconds: u64,
}

impl RedisSessionStore {
    pub fn new(redis: RedisClient, ttl_seconds: u64) -> Self {
        Self { redis, ttl_seconds }
    }
}

fn session_key(workflow_id: Uuid) -> String {
    format!("booking:{}", workflow_id)
}

fn leg_fields(leg_index: usize) -> (String, String) {
    (
        format!("leg:{}:token", leg_index),
        format!("leg:{}:handle", leg_index),
    )
}

/// Both halves or neither; a lone token or handle is unusable.
fn binding_from(
    key: &str,
    leg_index: usize,
    token: Option<String>,
    handle: Option<String>,
) -> Result<Option<OfferBinding>, StoreError> {
    match (token, handle) {
        (Some(token), Some(handle)) => Ok(Some(OfferBinding::new(token, handle))),
        (None, None) => Ok(None),
        _ => Err(StoreError::Corrupt {
            key: key.to_string(),
            reason: format!("leg {} has only half of its binding", leg_index),
        }),
    }
}

fn backend(e: redis::RedisError) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn token(&self, workflow_id: Uuid) -> Result<Option<String>, StoreError> {
        self.redis
            .hget_field(&session_key(workflow_id), TOKEN_FIELD)
            .await
            .map_err(backend)
    }

    async fn set_token(&self, workflow_id: Uuid, token: &str) -> Result<(), StoreError> {
        let key = session_key(workflow_id);
        self.redis
            .hset_fields(&key, &[(TOKEN_FIELD.to_string(), token.to_string())], self.ttl_seconds)
            .await
            .map_err(backend)?;
        debug!("Session token stored for {}", workflow_id);
        Ok(())
    }

    async fn leg_binding(
        &self,
        workflow_id: Uuid,
        leg_index: usize,
    ) -> Result<Option<OfferBinding>, StoreError> {
        let key = session_key(workflow_id);
        let (token_field, handle_field) = leg_fields(leg_index);
        let token = self.redis.hget_field(&key, &token_field).await.map_err(backend)?;
        let handle = self.redis.hget_field(&key, &handle_field).await.map_err(backend)?;
        binding_from(&key, leg_index, token, handle)
    }

    async fn set_leg_binding(
        &self,
        workflow_id: Uuid,
        leg_index: usize,
        binding: &OfferBinding,
    ) -> Result<(), StoreError> {
        let key = session_key(workflow_id);
        let (token_field, handle_field) = leg_fields(leg_index);
        let fields = [
            (token_field, binding.session_token.clone()),
            (handle_field, binding.offer_handle.clone()),
        ];
        self.redis
            .hset_fields(&key, &fields, self.ttl_seconds)
            .await
            .map_err(backend)?;
        info!("Leg {} binding stored for {}", leg_index, workflow_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let id = Uuid::nil();
        assert_eq!(session_key(id), "booking:00000000-0000-0000-0000-000000000000");
        assert_eq!(
            leg_fields(2),
            ("leg:2:token".to_string(), "leg:2:handle".to_string())
        );
    }

    #[test]
    fn test_half_binding_is_corrupt() {
        assert_eq!(binding_from("k", 0, None, None).unwrap(), None);
        assert_eq!(
            binding_from("k", 0, Some("t".into()), Some("h".into())).unwrap(),
            Some(OfferBinding::new("t", "h"))
        );
        assert!(matches!(
            binding_from("k", 1, Some("t".into()), None),
            Err(StoreError::Corrupt { .. })
        ));
    }
}
