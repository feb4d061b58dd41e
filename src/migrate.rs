use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// `filing-rag init`: create or upgrade the schema, then close.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Idempotent schema creation.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // One row per company: which passage version is live.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            company_code TEXT PRIMARY KEY,
            version TEXT NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            passage_count INTEGER NOT NULL,
            chunk_size INTEGER NOT NULL,
            overlap INTEGER NOT NULL,
            source_hash TEXT NOT NULL,
            built_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Staged and live passages; only rows whose version matches
    // collections.version are ever read.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS passages (
            version TEXT NOT NULL,
            seq INTEGER NOT NULL,
            company_code TEXT NOT NULL,
            id TEXT NOT NULL,
            start_char INTEGER NOT NULL,
            end_char INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            embedding BLOB NOT NULL,
            PRIMARY KEY (version, seq)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS build_locks (
            company_code TEXT PRIMARY KEY,
            version TEXT NOT NULL,
            started_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_passages_company ON passages(company_code)")
        .execute(pool)
        .await?;

    Ok(())
}
