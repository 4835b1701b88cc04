//! Document CRUD/fetch service logic, shared by the REST surface and the
//! CLI. A document has no row of its own; these functions operate on the
//! chunks that share a `document_id` (spec §3.1, §4.D).

use crate::config::Config;
use crate::embedding::Embedder;
use crate::errors::AppError;
use crate::fetch;
use crate::ingest::{self, IngestOutcome, IngestRequest};
use crate::models::DocumentSummary;
use crate::store::{ChunkFilter, Store};

pub async fn create_from_content(
    store: &dyn Store,
    embedder: &dyn Embedder,
    config: &Config,
    library_id: &str,
    title: &str,
    content: &str,
) -> Result<IngestOutcome, AppError> {
    crate::store::resolve_library_ref(store, library_id).await?;
    ingest::ingest_document(
        store,
        embedder,
        config,
        IngestRequest { library_id, title, content, source: "upload", source_type: "markdown", document_id: None, created_at: None },
    )
    .await
}

pub async fn create_from_url(
    store: &dyn Store,
    embedder: &dyn Embedder,
    config: &Config,
    http_client: &reqwest::Client,
    library_id: &str,
    title: &str,
    url: &str,
) -> Result<IngestOutcome, AppError> {
    crate::store::resolve_library_ref(store, library_id).await?;
    let fetched = fetch::fetch_url(http_client, url, config.fetch_timeout, config.max_content_bytes).await?;
    ingest::ingest_document(
        store,
        embedder,
        config,
        IngestRequest { library_id, title, content: &fetched.body, source: url, source_type: &fetched.source_type, document_id: None, created_at: None },
    )
    .await
}

pub async fn list_documents(store: &dyn Store, library_id: Option<&str>) -> Result<Vec<DocumentSummary>, AppError> {
    store.list_documents(library_id).await
}

pub async fn get_document_metadata(store: &dyn Store, document_id: &str) -> Result<DocumentSummary, AppError> {
    store
        .list_documents(None)
        .await?
        .into_iter()
        .find(|d| d.document_id == document_id)
        .ok_or_else(|| AppError::not_found("document.not_found", format!("no document with id '{document_id}'")))
}

/// Raw concatenated content of every chunk, ordered by `chunk_index`.
pub async fn get_document_content(store: &dyn Store, document_id: &str) -> Result<String, AppError> {
    let chunks = store.scan_chunks_where(&ChunkFilter { document_id: Some(document_id.to_string()), ..Default::default() }).await?;
    if chunks.is_empty() {
        return Err(AppError::not_found("document.not_found", format!("no document with id '{document_id}'")));
    }
    Ok(chunks.into_iter().map(|c| c.text).collect::<Vec<_>>().join("\n\n"))
}

pub async fn replace_content(store: &dyn Store, embedder: &dyn Embedder, config: &Config, document_id: &str, new_content: &str) -> Result<IngestOutcome, AppError> {
    ingest::replace_document_content(store, embedder, config, document_id, new_content).await
}

pub async fn delete_document(store: &dyn Store, document_id: &str) -> Result<u64, AppError> {
    let deleted = store.delete_chunks_where(&ChunkFilter { document_id: Some(document_id.to_string()), ..Default::default() }).await?;
    if deleted == 0 {
        return Err(AppError::not_found("document.not_found", format!("no document with id '{document_id}'")));
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::embedding::HashEmbedder;
    use crate::libraries::{create_library, NewLibrary};
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
    async fn create_list_get_delete_roundtrip() {
        let store = MemoryStore::new();
        let embedder = HashEmbedder::new(16);
        let config = test_config();
        let library = create_library(&store, NewLibrary { name: "react".to_string(), language: "javascript".to_string(), ecosystem: "npm".to_string(), ..Default::default() })
            .await
            .unwrap();

        let outcome = create_from_content(&store, &embedder, &config, &library.id, "Guide", "### A\nhello world\n").await.unwrap();
        let docs = list_documents(&store, Some(&library.id)).await.unwrap();
        assert_eq!(docs.len(), 1);

        let content = get_document_content(&store, &outcome.document_id).await.unwrap();
        assert!(content.contains("hello world"));

        let deleted = delete_document(&store, &outcome.document_id).await.unwrap();
        assert!(deleted > 0);
        assert!(get_document_metadata(&store, &outcome.document_id).await.is_err());
    }

    #[tokio::test]
    async fn create_rejects_unknown_library() {
        let store = MemoryStore::new();
        let embedder = HashEmbedder::new(16);
        let config = test_config();
        let result = create_from_content(&store, &embedder, &config, "does-not-exist", "Guide", "content").await;
        assert!(result.is_err());
    }
}
