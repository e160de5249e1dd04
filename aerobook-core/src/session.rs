use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::BookingError;
use crate::itinerary::OfferBinding;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session store backend error: {0}")]
    Backend(String),

    #[error("corrupt session entry {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        BookingError::Store(err.to_string())
    }
}

/// Persisted session state that UI collaborators read (fare rules, ancillary panel).
///
/// The recovery path writes every replacement binding here so nobody keeps
/// using a dead token.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Session token of the whole booking (one-way and round-trip).
    async fn token(&self, workflow_id: Uuid) -> Result<Option<String>, StoreError>;

    async fn set_token(&self, workflow_id: Uuid, token: &str) -> Result<(), StoreError>;

    /// Binding of the leg at `leg_index`.
    async fn leg_binding(
        &self,
        workflow_id: Uuid,
        leg_index: usize,
    ) -> Result<Option<OfferBinding>, StoreError>;

    async fn set_leg_binding(
        &self,
        workflow_id: Uuid,
        leg_index: usize,
        binding: &OfferBinding,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
struct SessionEntry {
    token: Option<String>,
    legs: HashMap<usize, OfferBinding>,
}

/// Process-local [`SessionStore`], used by tests and single-node deployments.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<Uuid, SessionEntry>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn token(&self, workflow_id: Uuid) -> Result<Option<String>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries.get(&workflow_id).and_then(|e| e.token.clone()))
    }

    async fn set_token(&self, workflow_id: Uuid, token: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.entry(workflow_id).or_default().token = Some(token.to_string());
        Ok(())
    }

    async fn leg_binding(
        &self,
        workflow_id: Uuid,
        leg_index: usize,
    ) -> Result<Option<OfferBinding>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(&workflow_id)
            .and_then(|e| e.legs.get(&leg_index).cloned()))
    }

    async fn set_leg_binding(
        &self,
        workflow_id: Uuid,
        leg_index: usize,
        binding: &OfferBinding,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries
            .entry(workflow_id)
            .or_default()
            .legs
            .insert(leg_index, binding.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_keeps_legs_apart() {
        let store = MemorySessionStore::new();
        let id = Uuid::new_v4();

        store.set_token(id, "trace-1").await.unwrap();
        store
            .set_leg_binding(id, 1, &OfferBinding::new("trace-2", "OB2"))
            .await
            .unwrap();

        assert_eq!(store.token(id).await.unwrap().as_deref(), Some("trace-1"));
        assert_eq!(store.leg_binding(id, 0).await.unwrap(), None);
        assert_eq!(
            store.leg_binding(id, 1).await.unwrap(),
            Some(OfferBinding::new("trace-2", "OB2"))
        );
        assert_eq!(store.token(Uuid::new_v4()).await.unwrap(), None);
    }
}
