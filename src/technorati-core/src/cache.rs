use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lru::LruCache;
use sqlx::SqlitePool;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::response::ParsedResponse;

/// Keyed store for successful query results.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<ParsedResponse>>;
    async fn put(&self, key: &str, value: &ParsedResponse, ttl: Option<Duration>) -> Result<()>;
}

fn expiry(ttl: Option<Duration>) -> Result<Option<DateTime<Utc>>> {
    ttl.map(|ttl| {
        chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|delta| Utc::now().checked_add_signed(delta))
            .ok_or_else(|| Error::Cache(format!("ttl of {}s is out of range", ttl.as_secs())))
    })
    .transpose()
}

#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.expired;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: ParsedResponse,
    expires_at: Option<DateTime<Utc>>,
}

/// In-process LRU cache
pub struct MemoryCache {
    entries: Arc<RwLock<LruCache<String, MemoryEntry>>>,
    stats: Arc<RwLock<CacheStats>>,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| Error::Config("cache capacity must be positive".to_string()))?;

        Ok(Self {
            entries: Arc::new(RwLock::new(LruCache::new(capacity))),
            stats: Arc::new(RwLock::new(CacheStats::default())),
        })
    }

    pub async fn stats(&self) -> CacheStats {
        self.stats.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[async_trait]
impl ResponseCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<ParsedResponse>> {
        let mut entries = self.entries.write().await;

        let Some(entry) = entries.get(key) else {
            self.stats.write().await.misses += 1;
            tracing::debug!(key, "Cache miss (memory)");
            return Ok(None);
        };

        if entry.expires_at.is_some_and(|at| at <= Utc::now()) {
            entries.pop(key);
            self.stats.write().await.expired += 1;
            tracing::debug!(key, "Cache entry expired (memory)");
            return Ok(None);
        }

        let value = entry.value.clone();
        self.stats.write().await.hits += 1;
        tracing::debug!(key, "Cache hit (memory)");
        Ok(Some(value))
    }

    async fn put(&self, key: &str, value: &ParsedResponse, ttl: Option<Duration>) -> Result<()> {
        let entry = MemoryEntry {
            value: value.clone(),
            expires_at: expiry(ttl)?,
        };
        self.entries.write().await.put(key.to_string(), entry);
        tracing::debug!(key, "Cached response (memory)");
        Ok(())
    }
}

/// SQLite-backed cache that survives restarts
pub struct SqliteCache {
    pool: SqlitePool,
}

impl SqliteCache {
    /// Open (creating if needed) a cache database file.
    pub async fn open(path: &str) -> Result<Self> {
        let pool = SqlitePool::connect(&format!("sqlite://{}?mode=rwc", path)).await?;
        Self::new(pool).await
    }

    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS response_cache (
                cache_key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                created_at DATETIME NOT NULL,
                expires_at DATETIME
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_response_cache_expires
            ON response_cache(expires_at)
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Delete expired rows, returning how many were removed.
    pub async fn evict_expired(&self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM response_cache WHERE expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ResponseCache for SqliteCache {
    async fn get(&self, key: &str) -> Result<Option<ParsedResponse>> {
        let row: Option<(String, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT payload, expires_at FROM response_cache WHERE cache_key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        let Some((payload, expires_at)) = row else {
            tracing::debug!(key, "Cache miss (sqlite)");
            return Ok(None);
        };

        if expires_at.is_some_and(|at| at <= Utc::now()) {
            sqlx::query("DELETE FROM response_cache WHERE cache_key = ?")
                .bind(key)
                .execute(&self.pool)
                .await?;
            tracing::debug!(key, "Cache entry expired (sqlite)");
            return Ok(None);
        }

        let value = serde_json::from_str(&payload)
            .map_err(|e| Error::Cache(format!("corrupt cache entry {key}: {e}")))?;
        tracing::debug!(key, "Cache hit (sqlite)");
        Ok(Some(value))
    }

    async fn put(&self, key: &str, value: &ParsedResponse, ttl: Option<Duration>) -> Result<()> {
        let payload = serde_json::to_string(value)
            .map_err(|e| Error::Cache(format!("cannot serialize response: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO response_cache (cache_key, payload, created_at, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(cache_key) DO UPDATE SET
                payload = excluded.payload,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(&payload)
        .bind(Utc::now())
        .bind(expiry(ttl)?)
        .execute(&self.pool)
        .await?;

        tracing::debug!(key, "Cached response (sqlite)");
        Ok(())
    }
}
