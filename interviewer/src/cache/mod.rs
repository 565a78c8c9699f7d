mod key;
mod sqlite;

pub use key::CacheKey;
pub use sqlite::SqliteCacheStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::schemas::completion_result::RawResponse;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cache payload error: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("cache directory error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache worker error: {0}")]
    Worker(String),
}

/// Durable store of provider responses keyed by request fingerprint.
///
/// Implementations own their own locking; several clients may share one store.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<RawResponse>, CacheError>;

    /// Store `payload` under `key`. `tag` is kept as metadata only.
    async fn set(
        &self,
        key: &CacheKey,
        payload: &RawResponse,
        tag: Option<&str>,
    ) -> Result<(), CacheError>;

    /// Number of stored entries.
    async fn len(&self) -> Result<u64, CacheError>;

    async fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len().await? == 0)
    }
}
