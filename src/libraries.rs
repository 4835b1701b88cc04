//! Library CRUD service logic, shared by the REST surface and the CLI.

use chrono::Utc;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{Library, LibraryStatus};
use crate::store::{LibraryFilter, Store};

#[derive(Debug, Clone, Default)]
pub struct NewLibrary {
    pub name: String,
    pub language: String,
    pub ecosystem: String,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub aliases: Vec<String>,
    pub keywords: Vec<String>,
    pub category: Option<String>,
    pub homepage_url: Option<String>,
    pub repository_url: Option<String>,
    pub author: Option<String>,
    pub license: Option<String>,
    pub popularity_score: Option<i64>,
}

/// Derives the canonical `/ecosystem/name` identifier (spec §3.2).
pub fn derive_context7_id(ecosystem: &str, name: &str) -> String {
    let normalized_name = crate::resolve::normalize_name(name);
    let normalized_ecosystem = crate::resolve::normalize_name(ecosystem);
    format!("/{normalized_ecosystem}/{normalized_name}")
}

pub async fn create_library(store: &dyn Store, input: NewLibrary) -> Result<Library, AppError> {
    if input.name.trim().is_empty() {
        return Err(AppError::validation("library.invalid_name", "library name must not be empty"));
    }
    let now = Utc::now();
    let library = Library {
        id: Uuid::new_v4().to_string(),
        context7_id: derive_context7_id(&input.ecosystem, &input.name),
        name: input.name,
        language: input.language,
        ecosystem: input.ecosystem,
        description: input.description,
        short_description: input.short_description,
        aliases: input.aliases,
        keywords: input.keywords,
        category: input.category,
        homepage_url: input.homepage_url,
        repository_url: input.repository_url,
        author: input.author,
        license: input.license,
        status: LibraryStatus::Active,
        popularity_score: input.popularity_score.unwrap_or(0),
        created_at: now,
        updated_at: now,
    };
    store.upsert_library(&library).await?;
    Ok(library)
}

pub async fn get_library(store: &dyn Store, id: &str) -> Result<Library, AppError> {
    store.get_library(id).await?.ok_or_else(|| AppError::not_found("library.not_found", format!("no library with id '{id}'")))
}

pub async fn list_libraries(store: &dyn Store, filter: &LibraryFilter, limit: i64, offset: i64) -> Result<Vec<Library>, AppError> {
    store.list_libraries(filter, limit, offset).await
}

/// Full replacement of a library's mutable fields (`PUT`); identity fields
/// (`id`, timestamps) are carried over from the existing record.
pub async fn replace_library(store: &dyn Store, id: &str, input: NewLibrary) -> Result<Library, AppError> {
    let existing = get_library(store, id).await?;
    let updated = Library {
        id: existing.id,
        context7_id: derive_context7_id(&input.ecosystem, &input.name),
        name: input.name,
        language: input.language,
        ecosystem: input.ecosystem,
        description: input.description,
        short_description: input.short_description,
        aliases: input.aliases,
        keywords: input.keywords,
        category: input.category,
        homepage_url: input.homepage_url,
        repository_url: input.repository_url,
        author: input.author,
        license: input.license,
        status: existing.status,
        popularity_score: input.popularity_score.unwrap_or(existing.popularity_score),
        created_at: existing.created_at,
        updated_at: Utc::now(),
    };
    store.update_library(&updated).await?;
    Ok(updated)
}

#[derive(Debug, Clone, Default)]
pub struct LibraryPatch {
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub aliases: Option<Vec<String>>,
    pub keywords: Option<Vec<String>>,
    pub category: Option<String>,
    pub homepage_url: Option<String>,
    pub repository_url: Option<String>,
    pub author: Option<String>,
    pub license: Option<String>,
    pub status: Option<LibraryStatus>,
    pub popularity_score: Option<i64>,
}

/// Partial update (`PATCH`); only fields present in `patch` are changed.
pub async fn patch_library(store: &dyn Store, id: &str, patch: LibraryPatch) -> Result<Library, AppError> {
    let mut existing = get_library(store, id).await?;
    if let Some(v) = patch.description {
        existing.description = Some(v);
    }
    if let Some(v) = patch.short_description {
        existing.short_description = Some(v);
    }
    if let Some(v) = patch.aliases {
        existing.aliases = v;
    }
    if let Some(v) = patch.keywords {
        existing.keywords = v;
    }
    if let Some(v) = patch.category {
        existing.category = Some(v);
    }
    if let Some(v) = patch.homepage_url {
        existing.homepage_url = Some(v);
    }
    if let Some(v) = patch.repository_url {
        existing.repository_url = Some(v);
    }
    if let Some(v) = patch.author {
        existing.author = Some(v);
    }
    if let Some(v) = patch.license {
        existing.license = Some(v);
    }
    if let Some(v) = patch.status {
        existing.status = v;
    }
    if let Some(v) = patch.popularity_score {
        existing.popularity_score = v;
    }
    existing.updated_at = Utc::now();
    store.update_library(&existing).await?;
    Ok(existing)
}

pub async fn delete_library(store: &dyn Store, id: &str) -> Result<(), AppError> {
    store.delete_library(id).await
}

pub async fn document_count(store: &dyn Store, library_id: &str) -> Result<i64, AppError> {
    store.document_count(library_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn derives_canonical_id() {
        assert_eq!(derive_context7_id("npm", "React"), "/npm/react");
        assert_eq!(derive_context7_id("PyPI", "Solid JS"), "/pypi/solid-js");
    }

    #[tokio::test]
    async fn create_then_patch_roundtrips() {
        let store = MemoryStore::new();
        let created = create_library(
            &store,
            NewLibrary { name: "react".to_string(), language: "javascript".to_string(), ecosystem: "npm".to_string(), ..Default::default() },
        )
        .await
        .unwrap();

        let patched = patch_library(&store, &created.id, LibraryPatch { license: Some("MIT".to_string()), ..Default::default() }).await.unwrap();
        assert_eq!(patched.license.as_deref(), Some("MIT"));
        assert_eq!(patched.context7_id, "/npm/react");
    }

    #[tokio::test]
    async fn duplicate_name_conflicts() {
        let store = MemoryStore::new();
        create_library(&store, NewLibrary { name: "react".to_string(), language: "javascript".to_string(), ecosystem: "npm".to_string(), ..Default::default() })
            .await
            .unwrap();
        let result =
            create_library(&store, NewLibrary { name: "react".to_string(), language: "javascript".to_string(), ecosystem: "npm".to_string(), ..Default::default() }).await;
        assert!(result.is_err());
    }
}
