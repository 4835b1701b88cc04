//! In-memory [`Store`] implementation used by tests. Implements the exact
//! same contract as [`super::SqliteStore`] so integration tests can swap one
//! for the other without touching the service layer.

use async_trait::async_trait;
use std::sync::RwLock;

use super::{ChunkFilter, ChunkMatch, LibraryFilter, Store};
use crate::embedding::cosine_similarity;
use crate::errors::AppError;
use crate::models::{Chunk, DocumentSummary, Library};

#[derive(Default)]
pub struct MemoryStore {
    libraries: RwLock<Vec<Library>>,
    chunks: RwLock<Vec<Chunk>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_library(&self, library: &Library) -> Result<(), AppError> {
        let mut libraries = self.libraries.write().unwrap();
        let collides = libraries
            .iter()
            .any(|l| l.id != library.id && ((l.ecosystem == library.ecosystem && l.name == library.name) || l.context7_id == library.context7_id));
        if collides {
            return Err(AppError::conflict(
                "library.duplicate_name",
                format!("a library named '{}' already exists in ecosystem '{}'", library.name, library.ecosystem),
            ));
        }
        libraries.push(library.clone());
        Ok(())
    }

    async fn update_library(&self, library: &Library) -> Result<(), AppError> {
        let mut libraries = self.libraries.write().unwrap();
        let collides = libraries
            .iter()
            .any(|l| l.id != library.id && ((l.ecosystem == library.ecosystem && l.name == library.name) || l.context7_id == library.context7_id));
        if collides {
            return Err(AppError::conflict(
                "library.duplicate_name",
                format!("a library named '{}' already exists in ecosystem '{}'", library.name, library.ecosystem),
            ));
        }
        let slot = libraries
            .iter_mut()
            .find(|l| l.id == library.id)
            .ok_or_else(|| AppError::not_found("library.not_found", format!("no library with id '{}'", library.id)))?;
        *slot = library.clone();
        Ok(())
    }

    async fn get_library(&self, id: &str) -> Result<Option<Library>, AppError> {
        Ok(self.libraries.read().unwrap().iter().find(|l| l.id == id).cloned())
    }

    async fn get_library_by_context7_id(&self, context7_id: &str) -> Result<Option<Library>, AppError> {
        Ok(self.libraries.read().unwrap().iter().find(|l| l.context7_id == context7_id).cloned())
    }

    async fn list_libraries(&self, filter: &LibraryFilter, limit: i64, offset: i64) -> Result<Vec<Library>, AppError> {
        let mut items: Vec<Library> = self
            .libraries
            .read()
            .unwrap()
            .iter()
            .filter(|l| filter.ecosystem.as_deref().map_or(true, |e| e == l.ecosystem))
            .filter(|l| filter.status.map_or(true, |s| s == l.status))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        let start = offset.max(0) as usize;
        let end = (start + limit.max(0) as usize).min(items.len());
        Ok(if start >= items.len() { Vec::new() } else { items[start..end].to_vec() })
    }

    async fn delete_library(&self, id: &str) -> Result<(), AppError> {
        if self.document_count(id).await? > 0 {
            return Err(AppError::conflict("library.has_documents", "library has documents and cannot be deleted"));
        }
        let mut libraries = self.libraries.write().unwrap();
        let before = libraries.len();
        libraries.retain(|l| l.id != id);
        if libraries.len() == before {
            return Err(AppError::not_found("library.not_found", format!("no library with id '{id}'")));
        }
        Ok(())
    }

    async fn document_count(&self, library_id: &str) -> Result<i64, AppError> {
        let chunks = self.chunks.read().unwrap();
        let mut ids: Vec<&str> = chunks.iter().filter(|c| c.library_id == library_id).map(|c| c.document_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids.len() as i64)
    }

    async fn append_chunks(&self, new_chunks: &[Chunk]) -> Result<(), AppError> {
        self.chunks.write().unwrap().extend_from_slice(new_chunks);
        Ok(())
    }

    async fn delete_chunks_where(&self, filter: &ChunkFilter) -> Result<u64, AppError> {
        let mut chunks = self.chunks.write().unwrap();
        let before = chunks.len();
        chunks.retain(|c| !filter.matches(c));
        Ok((before - chunks.len()) as u64)
    }

    async fn vector_search(&self, query_vector: &[f32], filter: &ChunkFilter, k: i64) -> Result<Vec<ChunkMatch>, AppError> {
        let chunks = self.chunks.read().unwrap();
        let mut matches: Vec<ChunkMatch> = chunks
            .iter()
            .filter(|c| filter.matches(c))
            .map(|c| {
                let similarity = cosine_similarity(query_vector, &c.vector);
                ChunkMatch { chunk: c.clone(), distance: 1.0 - similarity as f64 }
            })
            .collect();
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
        let mut items: Vec<Chunk> = self.chunks.read().unwrap().iter().filter(|c| filter.matches(c)).cloned().collect();
        items.sort_by_key(|c| c.chunk_index);
        Ok(items)
    }

    async fn list_documents(&self, library_id: Option<&str>) -> Result<Vec<DocumentSummary>, AppError> {
        let chunks = self.chunks.read().unwrap();
        let mut by_doc: Vec<DocumentSummary> = Vec::new();
        for chunk in chunks.iter().filter(|c| library_id.map_or(true, |lib| c.library_id == lib)) {
            if let Some(existing) = by_doc.iter_mut().find(|d| d.document_id == chunk.document_id) {
                if chunk.created_at < existing.created_at {
                    existing.created_at = chunk.created_at;
                }
            } else {
                by_doc.push(DocumentSummary {
                    document_id: chunk.document_id.clone(),
                    library_id: chunk.library_id.clone(),
                    title: chunk.title.clone(),
                    chunk_total: chunk.chunk_total,
                    source: chunk.source.clone(),
                    source_type: chunk.source_type.clone(),
                    created_at: chunk.created_at,
                });
            }
        }
        by_doc.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(by_doc)
    }
}
