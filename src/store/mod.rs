//! Chunk Store contract (spec §4.A).
//!
//! Durable append-and-filter storage for library records and document
//! chunks. [`SqliteStore`] is the concrete, production-facing
//! implementation; [`MemoryStore`] is a `RwLock`-guarded in-memory
//! implementation of the identical contract, used by tests.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::errors::AppError;
use crate::models::{Chunk, DocumentSummary, Library, LibraryStatus};

#[derive(Debug, Clone, Default)]
pub struct LibraryFilter {
    pub ecosystem: Option<String>,
    pub status: Option<LibraryStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct ChunkFilter {
    pub library_id: Option<String>,
    pub document_id: Option<String>,
    pub source_type: Option<String>,
}

impl ChunkFilter {
    pub fn matches(&self, chunk: &Chunk) -> bool {
        if let Some(lib) = &self.library_id {
            if &chunk.library_id != lib {
                return false;
            }
        }
        if let Some(doc) = &self.document_id {
            if &chunk.document_id != doc {
                return false;
            }
        }
        if let Some(st) = &self.source_type {
            if &chunk.source_type != st {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone)]
pub struct ChunkMatch {
    pub chunk: Chunk,
    pub distance: f64,
}

/// The capability boundary between the query/ingestion engine and whatever
/// durably stores libraries and chunks. §4.A's contract, expressed as a
/// Rust trait so a fake implementation can stand in for tests.
#[async_trait]
pub trait Store: Send + Sync {
    async fn upsert_library(&self, library: &Library) -> Result<(), AppError>;
    async fn update_library(&self, library: &Library) -> Result<(), AppError>;
    async fn get_library(&self, id: &str) -> Result<Option<Library>, AppError>;
    async fn get_library_by_context7_id(&self, context7_id: &str) -> Result<Option<Library>, AppError>;
    async fn list_libraries(&self, filter: &LibraryFilter, limit: i64, offset: i64) -> Result<Vec<Library>, AppError>;
    async fn delete_library(&self, id: &str) -> Result<(), AppError>;
    async fn document_count(&self, library_id: &str) -> Result<i64, AppError>;

    async fn append_chunks(&self, chunks: &[Chunk]) -> Result<(), AppError>;
    async fn delete_chunks_where(&self, filter: &ChunkFilter) -> Result<u64, AppError>;
    async fn vector_search(&self, query_vector: &[f32], filter: &ChunkFilter, k: i64) -> Result<Vec<ChunkMatch>, AppError>;
    async fn scan_chunks_where(&self, filter: &ChunkFilter) -> Result<Vec<Chunk>, AppError>;
    async fn list_documents(&self, library_id: Option<&str>) -> Result<Vec<DocumentSummary>, AppError>;
}

/// Resolves a library reference that may be either the internal `id` or the
/// canonical `context7_id` (spec §4.E.1 step 1).
pub async fn resolve_library_ref(store: &dyn Store, reference: &str) -> Result<Library, AppError> {
    if let Some(library) = store.get_library(reference).await? {
        return Ok(library);
    }
    if let Some(library) = store.get_library_by_context7_id(reference).await? {
        return Ok(library);
    }
    Err(AppError::not_found("library.not_found", format!("no library matches '{reference}'")))
}
