//! Core data models used throughout libdocs.
//!
//! These types represent the libraries, documents, and chunks that flow
//! through the ingestion and retrieval pipeline. A document is never stored
//! as a row of its own; its identity and denormalized metadata live on every
//! `Chunk` that shares its `document_id` and are recovered by grouping (see
//! [`DocumentSummary`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`Library`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryStatus {
    Active,
    Deprecated,
    Archived,
}

impl Default for LibraryStatus {
    fn default() -> Self {
        LibraryStatus::Active
    }
}

impl LibraryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LibraryStatus::Active => "active",
            LibraryStatus::Deprecated => "deprecated",
            LibraryStatus::Archived => "archived",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(LibraryStatus::Active),
            "deprecated" => Some(LibraryStatus::Deprecated),
            "archived" => Some(LibraryStatus::Archived),
            _ => None,
        }
    }
}

/// A logical grouping of documentation for a single piece of software.
#[derive(Debug, Clone)]
pub struct Library {
    pub id: String,
    pub name: String,
    pub context7_id: String,
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
    pub status: LibraryStatus,
    pub popularity_score: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Denormalized summary of a document, recovered by grouping chunks on
/// `document_id` rather than read from a row of its own.
#[derive(Debug, Clone)]
pub struct DocumentSummary {
    pub document_id: String,
    pub library_id: String,
    pub title: String,
    pub chunk_total: i64,
    pub source: String,
    pub source_type: String,
    pub created_at: DateTime<Utc>,
}

/// The unit of storage and retrieval: one semantically coherent slice of a
/// document's text, with its embedding vector and denormalized document
/// metadata attached.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub library_id: String,
    pub title: String,
    pub text: String,
    pub vector: Vec<f32>,
    pub chunk_index: i64,
    pub chunk_total: i64,
    pub source: String,
    pub source_type: String,
    pub created_at: DateTime<Utc>,
    pub metadata_json: Option<String>,
}
