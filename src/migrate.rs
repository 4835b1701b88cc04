//! Database schema migrations.
//!
//! Creates the `libraries` and `chunks` tables and ensures idempotent
//! execution, so `run_migrations` can safely run on every startup.

use anyhow::{bail, Result};
use sqlx::sqlite::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    run_migrations_on(&pool).await?;
    check_embedding_dimension(&pool, config.embedding_dim).await?;
    pool.close().await;
    Ok(())
}

pub async fn run_migrations_on(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS libraries (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            context7_id TEXT NOT NULL UNIQUE,
            language TEXT NOT NULL,
            ecosystem TEXT NOT NULL,
            description TEXT,
            short_description TEXT,
            aliases_json TEXT NOT NULL DEFAULT '[]',
            keywords_json TEXT NOT NULL DEFAULT '[]',
            category TEXT,
            homepage_url TEXT,
            repository_url TEXT,
            author TEXT,
            license TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            popularity_score INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(ecosystem, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            library_id TEXT NOT NULL,
            title TEXT NOT NULL,
            text TEXT NOT NULL,
            vector BLOB NOT NULL,
            chunk_index INTEGER NOT NULL,
            chunk_total INTEGER NOT NULL,
            source TEXT NOT NULL,
            source_type TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            metadata_json TEXT,
            UNIQUE(document_id, chunk_index),
            FOREIGN KEY (library_id) REFERENCES libraries(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_library_id ON chunks(library_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_libraries_context7_id ON libraries(context7_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Refuses to start if any persisted chunk's vector dimension disagrees
/// with the configured `EMBEDDING_DIM` (spec §6 persisted state layout).
async fn check_embedding_dimension(pool: &SqlitePool, expected_dim: usize) -> Result<()> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT LENGTH(vector) FROM chunks LIMIT 1")
        .fetch_optional(pool)
        .await?;
    if let Some((byte_len,)) = row {
        let stored_dim = (byte_len / 4) as usize;
        if stored_dim != expected_dim {
            bail!(
                "EMBEDDING_DIM={expected_dim} does not match the dimension of data already in the store ({stored_dim}); refusing to start"
            );
        }
    }
    Ok(())
}
