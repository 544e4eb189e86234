// Cross-reference cache: durable (primary provider, primary id) -> mappings
//
// Persists which id every other provider uses for a title the primary
// provider resolved, so repeat lookups skip live searches. Entries older
// than the TTL are stale; staleness is a caller policy (`is_expired`), the
// cache never hides stale rows on lookup.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tokio::sync::RwLock;

use crate::db;
use crate::error::CacheError;
use crate::models::{CrossReferenceEntry, ProviderId};

/// Entries older than this are considered stale (exclusive boundary: an
/// entry exactly this old is still fresh).
pub const DEFAULT_TTL_DAYS: i64 = 7;

pub struct CrossReferenceCache {
    database_url: String,
    ttl: ChronoDuration,
    /// Lazily opened by `init()`; every method fails with `NotInitialized`
    /// before that
    pool: RwLock<Option<SqlitePool>>,
}

impl CrossReferenceCache {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ttl: ChronoDuration::days(DEFAULT_TTL_DAYS),
            pool: RwLock::new(None),
        }
    }

    pub fn with_ttl_days(mut self, days: i64) -> Self {
        self.ttl = ChronoDuration::days(days);
        self
    }

    /// Open (creating if missing) the backing store and run the migration.
    /// Idempotent: calling again after a successful init is a no-op.
    pub async fn init(&self) -> Result<(), CacheError> {
        {
            let pool = self.pool.read().await;
            if pool.is_some() {
                return Ok(());
            }
        }

        let mut guard = self.pool.write().await;
        if guard.is_some() {
            return Ok(());
        }

        let options = SqliteConnectOptions::from_str(&self.database_url)
            .map_err(CacheError::Store)?
            .create_if_missing(true);

        // An in-memory database exists per connection, so it must be pinned
        // to a single pooled connection to stay coherent.
        let in_memory = self.database_url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 4 })
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        db::configure_connection(&pool).await?;
        db::migrate(&pool).await?;

        tracing::info!("Cross-reference cache opened at {}", self.database_url);
        *guard = Some(pool);
        Ok(())
    }

    async fn pool(&self) -> Result<SqlitePool, CacheError> {
        self.pool
            .read()
            .await
            .clone()
            .ok_or(CacheError::NotInitialized)
    }

    /// Upsert the cross-reference entry for `(primary_provider,
    /// primary_media_id)`.
    ///
    /// Merge-on-write: the new mappings are unioned with any fresh mappings
    /// already cached for the key (new values winning per provider), so an
    /// incremental matcher pass never drops previously accepted
    /// cross-references. A stale existing entry is replaced outright. The
    /// primary provider itself is never stored in the mappings.
    pub async fn store(
        &self,
        primary_provider: &ProviderId,
        primary_media_id: &str,
        mappings: &HashMap<ProviderId, String>,
    ) -> Result<(), CacheError> {
        let pool = self.pool().await?;
        let key = CrossReferenceEntry::cache_key(primary_provider, primary_media_id);

        let mut merged: HashMap<ProviderId, String> = match self
            .lookup_entry(primary_provider, primary_media_id)
            .await?
        {
            Some(existing) if !self.is_expired(existing.cached_at) => existing.mappings,
            _ => HashMap::new(),
        };
        for (provider, id) in mappings {
            if provider == primary_provider {
                continue;
            }
            merged.insert(provider.clone(), id.clone());
        }

        let json = serde_json::to_string(&merged)
            .map_err(|e| CacheError::Corrupt(format!("failed to encode mappings: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO cross_references
                (cache_key, primary_provider, primary_media_id, mappings, cached_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(cache_key) DO UPDATE SET
                mappings = excluded.mappings,
                cached_at = excluded.cached_at
            "#,
        )
        .bind(&key)
        .bind(primary_provider.as_str())
        .bind(primary_media_id)
        .bind(&json)
        .bind(Utc::now().timestamp())
        .execute(&pool)
        .await?;

        tracing::debug!(
            "Stored cross-references for {}: {} provider(s)",
            key,
            merged.len()
        );
        Ok(())
    }

    /// The stored mappings for a key, or `None` if absent. Stale entries are
    /// returned as-is; filtering them is the caller's policy decision.
    pub async fn lookup(
        &self,
        primary_provider: &ProviderId,
        primary_media_id: &str,
    ) -> Result<Option<HashMap<ProviderId, String>>, CacheError> {
        Ok(self
            .lookup_entry(primary_provider, primary_media_id)
            .await?
            .map(|entry| entry.mappings))
    }

    /// Full stored entry including `cached_at`, for callers that apply the
    /// staleness policy themselves.
    pub async fn lookup_entry(
        &self,
        primary_provider: &ProviderId,
        primary_media_id: &str,
    ) -> Result<Option<CrossReferenceEntry>, CacheError> {
        let pool = self.pool().await?;
        let key = CrossReferenceEntry::cache_key(primary_provider, primary_media_id);

        let row = sqlx::query(
            "SELECT primary_provider, primary_media_id, mappings, cached_at \
             FROM cross_references WHERE cache_key = ?",
        )
        .bind(&key)
        .fetch_optional(&pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mappings: HashMap<ProviderId, String> =
            serde_json::from_str(row.get::<String, _>("mappings").as_str())
                .map_err(|e| CacheError::Corrupt(format!("bad mappings for {}: {}", key, e)))?;
        let cached_at = DateTime::<Utc>::from_timestamp(row.get::<i64, _>("cached_at"), 0)
            .ok_or_else(|| CacheError::Corrupt(format!("bad timestamp for {}", key)))?;

        Ok(Some(CrossReferenceEntry {
            primary_provider: ProviderId::new(row.get::<String, _>("primary_provider")),
            primary_media_id: row.get::<String, _>("primary_media_id"),
            mappings,
            cached_at,
        }))
    }

    /// Whether an entry cached at `cached_at` is past the TTL. The boundary
    /// is exclusive: an entry exactly TTL old is not yet expired. Ages are
    /// compared at second granularity, matching the persisted timestamps.
    pub fn is_expired(&self, cached_at: DateTime<Utc>) -> bool {
        (Utc::now() - cached_at).num_seconds() > self.ttl.num_seconds()
    }

    /// Remove every expired entry. Safe to call at any time; fresh entries
    /// are untouched. Returns how many rows were evicted.
    pub async fn clear_expired(&self) -> Result<u64, CacheError> {
        let pool = self.pool().await?;
        let cutoff = (Utc::now() - self.ttl).timestamp();

        let result = sqlx::query("DELETE FROM cross_references WHERE cached_at < ?")
            .bind(cutoff)
            .execute(&pool)
            .await?;

        let evicted = result.rows_affected();
        if evicted > 0 {
            tracing::info!("Evicted {} expired cross-reference entries", evicted);
        }
        Ok(evicted)
    }

    /// Drop every entry.
    pub async fn clear_all(&self) -> Result<(), CacheError> {
        let pool = self.pool().await?;
        sqlx::query("DELETE FROM cross_references")
            .execute(&pool)
            .await?;
        Ok(())
    }

    /// Number of stored entries (fresh and stale).
    pub async fn entry_count(&self) -> Result<i64, CacheError> {
        let pool = self.pool().await?;
        let row = sqlx::query("SELECT COUNT(*) AS n FROM cross_references")
            .fetch_one(&pool)
            .await?;
        Ok(row.get::<i64, _>("n"))
    }

    /// Rough storage footprint of the cached rows in bytes.
    pub async fn approximate_byte_size(&self) -> Result<i64, CacheError> {
        let pool = self.pool().await?;
        let row = sqlx::query(
            "SELECT COALESCE(SUM(LENGTH(cache_key) + LENGTH(primary_provider) \
             + LENGTH(primary_media_id) + LENGTH(mappings) + 8), 0) AS bytes \
             FROM cross_references",
        )
        .fetch_one(&pool)
        .await?;
        Ok(row.get::<i64, _>("bytes"))
    }
}
