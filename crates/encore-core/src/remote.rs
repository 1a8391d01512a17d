use crate::types::{EntityId, SongPage};
use async_trait::async_trait;
use thiserror::Error;

/// Failure from the remote authority. The coordinator does not interpret
/// causes: every variant is retried identically.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("transport: {0}")]
    Transport(String),

    #[error("rejected: {0}")]
    Rejected(String),
}

/// The remote source of truth for subscriptions and song pages. Transport
/// and auth live behind this seam; calls are latency-bearing, fallible, and
/// idempotent enough to retry.
#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    async fn set_subscription(&self, entity: &EntityId, desired: bool)
        -> Result<(), RemoteError>;

    async fn fetch_entity(&self, entity: &EntityId) -> Result<SongPage, RemoteError>;
}
