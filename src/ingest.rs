//! Ingestion pipeline (spec §4.D).
//!
//! Coordinates the full flow from raw content to stored, searchable chunks:
//! normalize → chunk → embed (batched, retried) → persist. Replacing a
//! document's content deletes its old chunks and rewrites them, preserving
//! the document's original `created_at`.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::chunk::{self, ChunkStrategy};
use crate::config::Config;
use crate::embedding::Embedder;
use crate::errors::AppError;
use crate::models::Chunk;
use crate::store::{ChunkFilter, Store};

pub struct IngestOutcome {
    pub document_id: String,
    pub chunk_count: usize,
}

/// Parameters for a single ingestion run. `document_id`/`created_at` are
/// supplied when replacing an existing document's content so its identity
/// and original timestamp survive the rewrite (spec §4.D.4).
pub struct IngestRequest<'a> {
    pub library_id: &'a str,
    pub title: &'a str,
    pub content: &'a str,
    pub source: &'a str,
    pub source_type: &'a str,
    pub document_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Runs normalize → chunk → embed → persist for one document (spec §4.D
/// steps 2-5). If `request.document_id` names an existing document, its
/// chunks are deleted first so the rewrite is atomic from the caller's view.
pub async fn ingest_document(
    store: &dyn Store,
    embedder: &dyn Embedder,
    config: &Config,
    request: IngestRequest<'_>,
) -> Result<IngestOutcome, AppError> {
    if request.content.trim().is_empty() {
        return Err(AppError::validation("document.empty", "document content is empty after normalization"));
    }
    if request.content.len() as u64 > config.max_content_bytes {
        return Err(AppError::validation(
            "document.too_large",
            format!("document content exceeds the {}-byte ceiling", config.max_content_bytes),
        ));
    }

    let document_id = request.document_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
    let created_at = request.created_at.unwrap_or_else(Utc::now);

    let pieces = chunk::chunk(request.content, &ChunkStrategy::default());
    if pieces.is_empty() {
        return Err(AppError::validation("document.empty", "chunking produced no content"));
    }

    let texts: Vec<String> = pieces.iter().map(|p| p.text.clone()).collect();
    let vectors = embed_with_retry(embedder, &texts, config.ingestion_concurrency).await?;

    let chunk_total = pieces.len() as i64;
    let rows: Vec<Chunk> = pieces
        .into_iter()
        .zip(vectors)
        .enumerate()
        .map(|(index, (piece, vector))| Chunk {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.clone(),
            library_id: request.library_id.to_string(),
            title: request.title.to_string(),
            text: piece.text,
            vector,
            chunk_index: index as i64,
            chunk_total,
            source: request.source.to_string(),
            source_type: request.source_type.to_string(),
            created_at,
            metadata_json: None,
        })
        .collect();

    if request.document_id.is_some() {
        store.delete_chunks_where(&ChunkFilter { document_id: request.document_id.clone(), ..Default::default() }).await?;
    }
    store.append_chunks(&rows).await?;

    Ok(IngestOutcome { document_id, chunk_count: rows.len() })
}

/// Deletes a document's existing chunks and re-ingests `new_content` under
/// the same `document_id`, preserving the earliest `created_at` among the
/// chunks being replaced (spec §4.D.4's "delete-then-rewrite").
pub async fn replace_document_content(
    store: &dyn Store,
    embedder: &dyn Embedder,
    config: &Config,
    document_id: &str,
    new_content: &str,
) -> Result<IngestOutcome, AppError> {
    let existing = store.scan_chunks_where(&ChunkFilter { document_id: Some(document_id.to_string()), ..Default::default() }).await?;
    let first = existing.first().ok_or_else(|| AppError::not_found("document.not_found", format!("no document with id '{document_id}'")))?;

    let request = IngestRequest {
        library_id: &first.library_id,
        title: &first.title,
        content: new_content,
        source: &first.source,
        source_type: &first.source_type,
        document_id: Some(document_id.to_string()),
        created_at: Some(first.created_at),
    };
    ingest_document(store, embedder, config, request).await
}

/// Embeds `texts` in one batch call, retrying only on transient
/// (`UpstreamUnavailable`) failures, using the same backoff schedule as the
/// embedder itself (spec §4.D.5).
async fn embed_with_retry(embedder: &dyn Embedder, texts: &[String], max_retries: usize) -> Result<Vec<Vec<f32>>, AppError> {
    let mut last_err: Option<AppError> = None;
    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay_ms = 500u64 * 2u64.pow(((attempt - 1) as u32).min(4));
            tracing::warn!(attempt, delay_ms, "retrying embedding batch during ingestion");
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms.min(8_000))).await;
        }
        match embedder.embed_batch(texts).await {
            Ok(vectors) => return Ok(vectors),
            Err(e) if e.kind == crate::errors::ErrorKind::UpstreamUnavailable => {
                last_err = Some(e);
                continue;
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| AppError::upstream_unavailable("embedder.unavailable", "embedding failed after retries")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::store::MemoryStore;

    fn test_config() -> Config {
        Config {
            store_path: std::path::PathBuf::from("./data"),
            embedder_model: "hash".to_string(),
            embedding_dim: 16,
            upstream_context7_url: None,
            http_port: 8000,
            fetch_timeout: std::time::Duration::from_secs(5),
            max_content_bytes: 1_000_000,
            ingestion_concurrency: 2,
        }
    }

    #[tokio::test]
    async fn ingests_markdown_into_chunks() {
        let store = MemoryStore::new();
        let embedder = HashEmbedder::new(16);
        let config = test_config();

        let content = "### Intro\nSome introductory text.\n\n### Usage\nHow to use the thing.\n";
        let outcome = ingest_document(
            &store,
            &embedder,
            &config,
            IngestRequest {
                library_id: "lib-1",
                title: "Guide",
                content,
                source: "upload",
                source_type: "markdown",
                document_id: None,
                created_at: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome.chunk_count, 2);
        let docs = store.list_documents(None).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].chunk_total, 2);
    }

    #[tokio::test]
    async fn rejects_empty_content() {
        let store = MemoryStore::new();
        let embedder = HashEmbedder::new(16);
        let config = test_config();

        let result = ingest_document(
            &store,
            &embedder,
            &config,
            IngestRequest {
                library_id: "lib-1",
                title: "Empty",
                content: "   \n\n  ",
                source: "upload",
                source_type: "markdown",
                document_id: None,
                created_at: None,
            },
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn replace_preserves_document_id_and_created_at() {
        let store = MemoryStore::new();
        let embedder = HashEmbedder::new(16);
        let config = test_config();

        let first = ingest_document(
            &store,
            &embedder,
            &config,
            IngestRequest {
                library_id: "lib-1",
                title: "Guide",
                content: "### A\nfirst version\n",
                source: "upload",
                source_type: "markdown",
                document_id: None,
                created_at: None,
            },
        )
        .await
        .unwrap();

        let replaced = replace_document_content(&store, &embedder, &config, &first.document_id, "### A\nsecond version\n").await.unwrap();
        assert_eq!(replaced.document_id, first.document_id);

        let docs = store.list_documents(None).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].document_id, first.document_id);
    }
}
