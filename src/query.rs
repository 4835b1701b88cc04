//! `query-docs`: semantic search within one library (spec §4.E.1).

use crate::embedding::{embed_query, Embedder};
use crate::errors::AppError;
use crate::store::{resolve_library_ref, ChunkFilter, ChunkMatch, Store};

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub rendered: String,
    pub matches: Vec<ChunkMatch>,
}

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub k: Option<i64>,
    pub source_type: Option<String>,
}

const DEFAULT_K: i64 = 5;

/// Resolves `library_ref` (canonical `context7_id` or internal `id`), embeds
/// `query`, and runs a vector search scoped to that library (spec §4.E.1
/// steps 1-5).
pub async fn query_docs(store: &dyn Store, embedder: &dyn Embedder, library_ref: &str, query: &str, options: QueryOptions) -> Result<QueryResult, AppError> {
    let library = resolve_library_ref(store, library_ref).await?;
    let query_vector = embed_query(embedder, query).await?;

    let filter = ChunkFilter { library_id: Some(library.id.clone()), document_id: None, source_type: options.source_type.clone() };
    let k = options.k.unwrap_or(DEFAULT_K);
    let matches = store.vector_search(&query_vector, &filter, k).await?;

    let rendered = render_matches(&matches);
    Ok(QueryResult { rendered, matches })
}

/// Renders ranked matches as the markdown payload described in spec §4.E.1
/// step 5: one `### <title> (section N/M)` + `Source:` block per chunk.
fn render_matches(matches: &[ChunkMatch]) -> String {
    if matches.is_empty() {
        return "No matching documentation was found for this query.".to_string();
    }
    let mut out = String::new();
    for m in matches {
        out.push_str(&format!("### {} (section {}/{})\n", m.chunk.title, m.chunk.chunk_index + 1, m.chunk.chunk_total));
        out.push_str(&format!("Source: {}\n\n", m.chunk.source));
        out.push_str(&m.chunk.text);
        out.push_str("\n\n");
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::models::{Chunk, Library, LibraryStatus};
    use crate::store::MemoryStore;

    fn sample_library(id: &str, context7_id: &str) -> Library {
        let now = chrono::Utc::now();
        Library {
            id: id.to_string(),
            name: "react".to_string(),
            context7_id: context7_id.to_string(),
            language: "javascript".to_string(),
            ecosystem: "npm".to_string(),
            description: None,
            short_description: None,
            aliases: Vec::new(),
            keywords: Vec::new(),
            category: None,
            homepage_url: None,
            repository_url: None,
            author: None,
            license: None,
            status: LibraryStatus::Active,
            popularity_score: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn finds_and_renders_matching_chunk() {
        let store = MemoryStore::new();
        let embedder = HashEmbedder::new(16);
        store.upsert_library(&sample_library("lib-1", "/npm/react")).await.unwrap();

        let vector = embedder.embed_batch(&["useState hook docs".to_string()]).await.unwrap().remove(0);
        store
            .append_chunks(&[Chunk {
                id: "chunk-1".to_string(),
                document_id: "doc-1".to_string(),
                library_id: "lib-1".to_string(),
                title: "Hooks".to_string(),
                text: "useState lets you add state to function components.".to_string(),
                vector,
                chunk_index: 0,
                chunk_total: 1,
                source: "upload".to_string(),
                source_type: "markdown".to_string(),
                created_at: chrono::Utc::now(),
                metadata_json: None,
            }])
            .await
            .unwrap();

        let result = query_docs(&store, &embedder, "/npm/react", "useState hook docs", QueryOptions::default()).await.unwrap();
        assert_eq!(result.matches.len(), 1);
        assert!(result.rendered.contains("### Hooks (section 1/1)"));
        assert!(result.rendered.contains("Source: upload"));
    }

    #[tokio::test]
    async fn empty_library_returns_note_not_error() {
        let store = MemoryStore::new();
        let embedder = HashEmbedder::new(16);
        store.upsert_library(&sample_library("lib-1", "/npm/react")).await.unwrap();

        let result = query_docs(&store, &embedder, "lib-1", "anything", QueryOptions::default()).await.unwrap();
        assert!(result.matches.is_empty());
        assert!(result.rendered.contains("No matching documentation"));
    }

    #[tokio::test]
    async fn unknown_library_is_not_found() {
        let store = MemoryStore::new();
        let embedder = HashEmbedder::new(16);
        let result = query_docs(&store, &embedder, "does-not-exist", "anything", QueryOptions::default()).await;
        assert!(result.is_err());
    }
}
