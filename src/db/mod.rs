use sqlx::SqlitePool;

/// Configure SQLite for concurrent readers and writers
/// This should be called once right after the pool is opened
pub async fn configure_connection(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // WAL mode for better concurrent read/write performance
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(pool)
        .await?;

    // Synchronous NORMAL is safe with WAL and much faster than FULL
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(pool)
        .await?;

    // Store temp tables in memory
    sqlx::query("PRAGMA temp_store = MEMORY")
        .execute(pool)
        .await?;

    // Busy timeout to handle concurrent access (5 seconds)
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(pool)
        .await?;

    tracing::debug!("SQLite configured: WAL mode, NORMAL sync, 5s busy timeout");

    Ok(())
}

pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cross_references (
            cache_key TEXT PRIMARY KEY,
            primary_provider TEXT NOT NULL,
            primary_media_id TEXT NOT NULL,
            mappings TEXT NOT NULL,
            cached_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_cross_references_cached_at
            ON cross_references(cached_at);
        "#,
    )
    .execute(pool)
    .await?;

    tracing::debug!("Database migration complete");

    Ok(())
}
