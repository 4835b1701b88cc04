//! SQLite-backed [`Store`] implementation.
//!
//! Vectors are stored as little-endian `f32` BLOBs and scored by a
//! brute-force cosine scan — the store targets the scale of a single
//! self-hosted deployment, not a sharded vector index.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use super::{ChunkFilter, ChunkMatch, LibraryFilter, Store};
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::errors::AppError;
use crate::models::{Chunk, DocumentSummary, Library, LibraryStatus};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn ts(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn from_ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

fn library_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Library, AppError> {
    let aliases_json: String = row.try_get("aliases_json")?;
    let keywords_json: String = row.try_get("keywords_json")?;
    let status_raw: String = row.try_get("status")?;
    Ok(Library {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        context7_id: row.try_get("context7_id")?,
        language: row.try_get("language")?,
        ecosystem: row.try_get("ecosystem")?,
        description: row.try_get("description")?,
        short_description: row.try_get("short_description")?,
        aliases: serde_json::from_str(&aliases_json).unwrap_or_default(),
        keywords: serde_json::from_str(&keywords_json).unwrap_or_default(),
        category: row.try_get("category")?,
        homepage_url: row.try_get("homepage_url")?,
        repository_url: row.try_get("repository_url")?,
        author: row.try_get("author")?,
        license: row.try_get("license")?,
        status: LibraryStatus::parse(&status_raw).unwrap_or_default(),
        popularity_score: row.try_get("popularity_score")?,
        created_at: from_ts(row.try_get("created_at")?),
        updated_at: from_ts(row.try_get("updated_at")?),
    })
}

fn chunk_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Chunk, AppError> {
    let vector_blob: Vec<u8> = row.try_get("vector")?;
    Ok(Chunk {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        library_id: row.try_get("library_id")?,
        title: row.try_get("title")?,
        text: row.try_get("text")?,
        vector: blob_to_vec(&vector_blob),
        chunk_index: row.try_get("chunk_index")?,
        chunk_total: row.try_get("chunk_total")?,
        source: row.try_get("source")?,
        source_type: row.try_get("source_type")?,
        created_at: from_ts(row.try_get("created_at")?),
        metadata_json: row.try_get("metadata_json")?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_library(&self, library: &Library) -> Result<(), AppError> {
        let existing_ecosystem: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM libraries WHERE (ecosystem = ? AND name = ?) OR context7_id = ?",
        )
        .bind(&library.ecosystem)
        .bind(&library.name)
        .bind(&library.context7_id)
        .fetch_optional(&self.pool)
        .await?;
        if let Some((existing_id,)) = existing_ecosystem {
            if existing_id != library.id {
                return Err(AppError::conflict(
                    "library.duplicate_name",
                    format!("a library named '{}' already exists in ecosystem '{}'", library.name, library.ecosystem),
                ));
            }
        }

        sqlx::query(
            r#"
            INSERT INTO libraries (
                id, name, context7_id, language, ecosystem, description, short_description,
                aliases_json, keywords_json, category, homepage_url, repository_url, author,
                license, status, popularity_score, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&library.id)
        .bind(&library.name)
        .bind(&library.context7_id)
        .bind(&library.language)
        .bind(&library.ecosystem)
        .bind(&library.description)
        .bind(&library.short_description)
        .bind(serde_json::to_string(&library.aliases).unwrap_or_else(|_| "[]".to_string()))
        .bind(serde_json::to_string(&library.keywords).unwrap_or_else(|_| "[]".to_string()))
        .bind(&library.category)
        .bind(&library.homepage_url)
        .bind(&library.repository_url)
        .bind(&library.author)
        .bind(&library.license)
        .bind(library.status.as_str())
        .bind(library.popularity_score)
        .bind(ts(library.created_at))
        .bind(ts(library.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_library(&self, library: &Library) -> Result<(), AppError> {
        let conflict: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM libraries WHERE ((ecosystem = ? AND name = ?) OR context7_id = ?) AND id != ?",
        )
        .bind(&library.ecosystem)
        .bind(&library.name)
        .bind(&library.context7_id)
        .bind(&library.id)
        .fetch_optional(&self.pool)
        .await?;
        if conflict.is_some() {
            return Err(AppError::conflict(
                "library.duplicate_name",
                format!("a library named '{}' already exists in ecosystem '{}'", library.name, library.ecosystem),
            ));
        }

        let result = sqlx::query(
            r#"
            UPDATE libraries SET
                name = ?, context7_id = ?, language = ?, ecosystem = ?, description = ?,
                short_description = ?, aliases_json = ?, keywords_json = ?, category = ?,
                homepage_url = ?, repository_url = ?, author = ?, license = ?, status = ?,
                popularity_score = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&library.name)
        .bind(&library.context7_id)
        .bind(&library.language)
        .bind(&library.ecosystem)
        .bind(&library.description)
        .bind(&library.short_description)
        .bind(serde_json::to_string(&library.aliases).unwrap_or_else(|_| "[]".to_string()))
        .bind(serde_json::to_string(&library.keywords).unwrap_or_else(|_| "[]".to_string()))
        .bind(&library.category)
        .bind(&library.homepage_url)
        .bind(&library.repository_url)
        .bind(&library.author)
        .bind(&library.license)
        .bind(library.status.as_str())
        .bind(library.popularity_score)
        .bind(ts(library.updated_at))
        .bind(&library.id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("library.not_found", format!("no library with id '{}'", library.id)));
        }
        Ok(())
    }

    async fn get_library(&self, id: &str) -> Result<Option<Library>, AppError> {
        let row = sqlx::query("SELECT * FROM libraries WHERE id = ?").bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(library_from_row).transpose()
    }

    async fn get_library_by_context7_id(&self, context7_id: &str) -> Result<Option<Library>, AppError> {
        let row = sqlx::query("SELECT * FROM libraries WHERE context7_id = ?")
            .bind(context7_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(library_from_row).transpose()
    }

    async fn list_libraries(&self, filter: &LibraryFilter, limit: i64, offset: i64) -> Result<Vec<Library>, AppError> {
        let mut sql = String::from("SELECT * FROM libraries WHERE 1=1");
        if filter.ecosystem.is_some() {
            sql.push_str(" AND ecosystem = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        sql.push_str(" ORDER BY name ASC LIMIT ? OFFSET ?");

        let mut query = sqlx::query(&sql);
        if let Some(eco) = &filter.ecosystem {
            query = query.bind(eco);
        }
        if let Some(status) = &filter.status {
            query = query.bind(status.as_str());
        }
        query = query.bind(limit).bind(offset);

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(library_from_row).collect()
    }

    async fn delete_library(&self, id: &str) -> Result<(), AppError> {
        let count = self.document_count(id).await?;
        if count > 0 {
            return Err(AppError::conflict("library.has_documents", "library has documents and cannot be deleted"));
        }
        let result = sqlx::query("DELETE FROM libraries WHERE id = ?").bind(id).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("library.not_found", format!("no library with id '{id}'")));
        }
        Ok(())
    }

    async fn document_count(&self, library_id: &str) -> Result<i64, AppError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(DISTINCT document_id) FROM chunks WHERE library_id = ?")
                .bind(library_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn append_chunks(&self, chunks: &[Chunk]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (
                    id, document_id, library_id, title, text, vector, chunk_index, chunk_total,
                    source, source_type, created_at, metadata_json
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(&chunk.library_id)
            .bind(&chunk.title)
            .bind(&chunk.text)
            .bind(vec_to_blob(&chunk.vector))
            .bind(chunk.chunk_index)
            .bind(chunk.chunk_total)
            .bind(&chunk.source)
            .bind(&chunk.source_type)
            .bind(ts(chunk.created_at))
            .bind(&chunk.metadata_json)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_chunks_where(&self, filter: &ChunkFilter) -> Result<u64, AppError> {
        let (sql, binds) = build_chunk_filter_sql("DELETE FROM chunks", filter);
        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn vector_search(&self, query_vector: &[f32], filter: &ChunkFilter, k: i64) -> Result<Vec<ChunkMatch>, AppError> {
        let (sql, binds) = build_chunk_filter_sql("SELECT * FROM chunks", filter);
        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut matches = Vec::with_capacity(rows.len());
        for row in &rows {
            let chunk = chunk_from_row(row)?;
            let similarity = cosine_similarity(query_vector, &chunk.vector);
            let distance = 1.0 - similarity as f64;
            matches.push(ChunkMatch { chunk, distance });
        }
        matches.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.document_id.cmp(&b.chunk.document_id))
                .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
        });
        matches.truncate(k.max(0) as usize);
        Ok(matches)
    }

    async fn scan_chunks_where(&self, filter: &ChunkFilter) -> Result<Vec<Chunk>, AppError> {
        let (sql, binds) = build_chunk_filter_sql("SELECT * FROM chunks", filter);
        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        let rows = query.fetch_all(&self.pool).await?;
        let mut chunks: Vec<Chunk> = rows.iter().map(chunk_from_row).collect::<Result<_, _>>()?;
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn list_documents(&self, library_id: Option<&str>) -> Result<Vec<DocumentSummary>, AppError> {
        let mut sql = String::from(
            "SELECT document_id, library_id, title, chunk_total, source, source_type, MIN(created_at) AS created_at \
             FROM chunks WHERE 1=1",
        );
        if library_id.is_some() {
            sql.push_str(" AND library_id = ?");
        }
        sql.push_str(" GROUP BY document_id ORDER BY created_at DESC");

        let mut query = sqlx::query(&sql);
        if let Some(lib) = library_id {
            query = query.bind(lib);
        }
        let rows = query.fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| {
                Ok(DocumentSummary {
                    document_id: row.try_get("document_id")?,
                    library_id: row.try_get("library_id")?,
                    title: row.try_get("title")?,
                    chunk_total: row.try_get("chunk_total")?,
                    source: row.try_get("source")?,
                    source_type: row.try_get("source_type")?,
                    created_at: from_ts(row.try_get("created_at")?),
                })
            })
            .collect()
    }
}

fn build_chunk_filter_sql(base: &str, filter: &ChunkFilter) -> (String, Vec<String>) {
    let mut sql = base.to_string();
    let mut binds = Vec::new();
    let mut clauses = Vec::new();
    if let Some(lib) = &filter.library_id {
        clauses.push("library_id = ?");
        binds.push(lib.clone());
    }
    if let Some(doc) = &filter.document_id {
        clauses.push("document_id = ?");
        binds.push(doc.clone());
    }
    if let Some(st) = &filter.source_type {
        clauses.push("source_type = ?");
        binds.push(st.clone());
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    (sql, binds)
}
