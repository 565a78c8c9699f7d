use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};

use super::{CacheError, CacheKey, CacheStore};
use crate::schemas::completion_result::RawResponse;

const CACHE_FILE: &str = "completions.sqlite3";

/// SQLite-backed [`CacheStore`].
///
/// The database runs in WAL mode with a busy timeout so separate processes can
/// read and write the same file. Queries run on the blocking pool.
#[derive(Clone)]
pub struct SqliteCacheStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCacheStore {
    /// Open (or create) the cache database inside `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, CacheError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let conn = Connection::open(dir.join(CACHE_FILE))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!("Opened completion cache in {} (journal={})", dir.display(), mode);

        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self, CacheError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CacheError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS completion_cache (
                key TEXT PRIMARY KEY,
                fingerprint TEXT NOT NULL,
                payload TEXT NOT NULL,
                tag TEXT,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, CacheError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| CacheError::Worker(format!("lock error: {e}")))?;
            f(&conn)
        })
        .await
        .map_err(|e| CacheError::Worker(format!("spawn_blocking error: {e}")))?
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<RawResponse>, CacheError> {
        let digest = key.digest();
        let payload = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT payload FROM completion_cache WHERE key = ?1",
                    rusqlite::params![digest],
                    |row| row.get::<_, String>(0),
                )
                .optional()
                .map_err(CacheError::from)
            })
            .await?;

        payload
            .map(|json| serde_json::from_str(&json).map_err(CacheError::from))
            .transpose()
    }

    async fn set(
        &self,
        key: &CacheKey,
        payload: &RawResponse,
        tag: Option<&str>,
    ) -> Result<(), CacheError> {
        let digest = key.digest();
        let fingerprint = key.as_str().to_string();
        let payload = serde_json::to_string(payload)?;
        let tag = tag.map(str::to_owned);

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO completion_cache (key, fingerprint, payload, tag, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![digest, fingerprint, payload, tag, Utc::now().timestamp()],
            )?;
            Ok(())
        })
        .await
    }

    async fn len(&self) -> Result<u64, CacheError> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM completion_cache", [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
        .await
    }
}
