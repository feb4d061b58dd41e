//! SQLite-backed [`VectorStore`] implementation.
//!
//! Collections are a pointer table (`collections`) over versioned passage
//! rows (`passages`). Staging writes rows under a fresh version inside one
//! transaction; committing repoints the company's `collections` row and
//! deletes the previous version's rows inside a second one. Every read
//! joins through `collections.version`, so staged or abandoned rows are
//! never returned.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use filing_rag_core::embedding::{blob_to_vec, vec_to_blob};
use filing_rag_core::models::{CollectionInfo, IndexedPassage, Passage};
use filing_rag_core::store::VectorStore;

/// SQLite implementation of the [`VectorStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const COLLECTION_COLUMNS: &str = "company_code, version, model, dims, passage_count, \
                                  chunk_size, overlap, source_hash, built_at";

fn row_to_info(row: &SqliteRow) -> CollectionInfo {
    CollectionInfo {
        company_code: row.get("company_code"),
        version: row.get("version"),
        model: row.get("model"),
        dims: row.get::<i64, _>("dims") as usize,
        passage_count: row.get::<i64, _>("passage_count") as usize,
        chunk_size: row.get::<i64, _>("chunk_size") as usize,
        overlap: row.get::<i64, _>("overlap") as usize,
        source_hash: row.get("source_hash"),
        built_at: row.get("built_at"),
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn collection(&self, company: &str) -> Result<Option<CollectionInfo>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM collections WHERE company_code = ?",
            COLLECTION_COLUMNS
        ))
        .bind(company)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_info))
    }

    async fn load_collection(
        &self,
        company: &str,
    ) -> Result<Option<(CollectionInfo, Vec<IndexedPassage>)>> {
        let info = match self.collection(company).await? {
            Some(info) => info,
            None => return Ok(None),
        };

        let rows = sqlx::query(
            r#"
            SELECT p.id, p.seq, p.start_char, p.end_char, p.text, p.hash, p.embedding
            FROM passages p
            JOIN collections c ON c.version = p.version
            WHERE c.company_code = ?
            ORDER BY p.seq ASC
            "#,
        )
        .bind(company)
        .fetch_all(&self.pool)
        .await?;

        let passages = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                IndexedPassage {
                    passage: Passage {
                        id: row.get("id"),
                        company_code: company.to_string(),
                        seq: row.get::<i64, _>("seq") as usize,
                        start: row.get::<i64, _>("start_char") as usize,
                        end: row.get::<i64, _>("end_char") as usize,
                        text: row.get("text"),
                        hash: row.get("hash"),
                    },
                    vector: blob_to_vec(&blob),
                }
            })
            .collect();

        Ok(Some((info, passages)))
    }

    async fn try_acquire_build(
        &self,
        company: &str,
        version: &str,
        stale_after_secs: i64,
    ) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        // Single statement: take the marker if free or abandoned.
        let result = sqlx::query(
            r#"
            INSERT INTO build_locks (company_code, version, started_at)
            VALUES (?, ?, ?)
            ON CONFLICT(company_code) DO UPDATE SET
                version = excluded.version,
                started_at = excluded.started_at
            WHERE build_locks.started_at <= ?
            "#,
        )
        .bind(company)
        .bind(version)
        .bind(now)
        .bind(now - stale_after_secs)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_build(&self, company: &str, version: &str) -> Result<()> {
        sqlx::query("DELETE FROM build_locks WHERE company_code = ? AND version = ?")
            .bind(company)
            .bind(version)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn stage_passages(
        &self,
        company: &str,
        version: &str,
        passages: &[IndexedPassage],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for ip in passages {
            let p = &ip.passage;
            sqlx::query(
                r#"
                INSERT INTO passages (version, seq, company_code, id, start_char, end_char,
                                      text, hash, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(version)
            .bind(p.seq as i64)
            .bind(company)
            .bind(&p.id)
            .bind(p.start as i64)
            .bind(p.end as i64)
            .bind(&p.text)
            .bind(&p.hash)
            .bind(vec_to_blob(&ip.vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn commit_collection(&self, info: &CollectionInfo) -> Result<Option<String>> {
        let mut tx = self.pool.begin().await?;

        let staged: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM passages WHERE version = ?")
            .bind(&info.version)
            .fetch_one(&mut *tx)
            .await?;
        if staged as usize != info.passage_count {
            bail!(
                "staged version {} of {} has {} passages, expected {}",
                info.version,
                info.company_code,
                staged,
                info.passage_count
            );
        }

        let previous: Option<String> =
            sqlx::query_scalar("SELECT version FROM collections WHERE company_code = ?")
                .bind(&info.company_code)
                .fetch_optional(&mut *tx)
                .await?;

        sqlx::query(
            r#"
            INSERT INTO collections (company_code, version, model, dims, passage_count,
                                     chunk_size, overlap, source_hash, built_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(company_code) DO UPDATE SET
                version = excluded.version,
                model = excluded.model,
                dims = excluded.dims,
                passage_count = excluded.passage_count,
                chunk_size = excluded.chunk_size,
                overlap = excluded.overlap,
                source_hash = excluded.source_hash,
                built_at = excluded.built_at
            "#,
        )
        .bind(&info.company_code)
        .bind(&info.version)
        .bind(&info.model)
        .bind(info.dims as i64)
        .bind(info.passage_count as i64)
        .bind(info.chunk_size as i64)
        .bind(info.overlap as i64)
        .bind(&info.source_hash)
        .bind(info.built_at)
        .execute(&mut *tx)
        .await?;

        // The committing build holds the marker, so every other version of
        // this company is either the replaced one or left by a dead build.
        sqlx::query("DELETE FROM passages WHERE company_code = ? AND version != ?")
            .bind(&info.company_code)
            .bind(&info.version)
            .execute(&mut *tx)
            .await?;
        let previous = previous.filter(|v| v != &info.version);

        tx.commit().await?;
        Ok(previous)
    }

    async fn discard_version(&self, _company: &str, version: &str) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM passages
            WHERE version = ?
              AND NOT EXISTS (SELECT 1 FROM collections WHERE version = ?)
            "#,
        )
        .bind(version)
        .bind(version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn drop_collection(&self, company: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        // Live and abandoned rows go; a build holding the marker keeps its own.
        sqlx::query(
            r#"
            DELETE FROM passages
            WHERE company_code = ?
              AND version NOT IN (SELECT version FROM build_locks WHERE company_code = ?)
            "#,
        )
        .bind(company)
        .bind(company)
        .execute(&mut *tx)
        .await?;

        let removed = sqlx::query("DELETE FROM collections WHERE company_code = ?")
            .bind(company)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(removed > 0)
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM collections ORDER BY company_code ASC",
            COLLECTION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_info).collect())
    }
}
