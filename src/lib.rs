//! # libdocs
//!
//! **A self-hosted documentation retrieval service.** A client names a
//! software library and asks a natural-language question; libdocs resolves
//! the library to a canonical identifier and returns the most relevant
//! documentation snippets, over both a REST API and an MCP (Model Context
//! Protocol) Streamable HTTP endpoint backed by the same store.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────┐   ┌─────────────┐
//! │  fetch   │──▶│  ingest   │──▶│  chunk   │──▶│  embedding  │
//! │ (upload, │   │ (pipeline)│   │ (h3/etc) │   │ (hash/oai)  │
//! │   URL)   │   └───────────┘   └──────────┘   └──────┬──────┘
//! └──────────┘                                         ▼
//!                                                 ┌──────────┐
//!                       ┌──────────────────────── │  store   │
//!                       ▼                         │ (SQLite) │
//!                 ┌───────────┐   ┌───────────┐   └──────────┘
//!                 │  resolve  │   │   query   │        ▲
//!                 └─────┬─────┘   └─────┬─────┘        │
//!                       └───────┬───────┘───────────────┘
//!                               ▼
//!                     ┌──────────────────┐
//!                     │ server (REST) /  │
//!                     │ mcp (rmcp)       │
//!                     └──────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Environment-variable configuration and validation |
//! | [`errors`] | Unified error taxonomy, mapped to HTTP and JSON-RPC in one place |
//! | [`models`] | Core data types: `Library`, `Chunk`, `DocumentSummary` |
//! | [`db`] | SQLite connection pool with WAL mode |
//! | [`migrate`] | Database schema migrations (idempotent) |
//! | [`store`] | Chunk Store contract and its SQLite / in-memory implementations |
//! | [`chunk`] | Markdown-h3 / character / paragraph / token chunking strategies |
//! | [`embedding`] | Embedder trait, hash-based and OpenAI-compatible implementations |
//! | [`fetch`] | URL fetch and upstream Context7 mirror fetch |
//! | [`ingest`] | Ingestion pipeline: acquire → normalize → chunk → embed → persist |
//! | [`libraries`] | Library CRUD service logic shared by REST and the CLI |
//! | [`documents`] | Document CRUD/fetch service logic shared by REST and the CLI |
//! | [`resolve`] | `resolve-library-id`: name → canonical id, with disambiguation |
//! | [`query`] | `query-docs`: embed a query, vector search, rank, render |
//! | [`server`] | REST API (Axum) with CORS |
//! | [`mcp`] | MCP Streamable HTTP transport, via `rmcp`'s `ServerHandler`/`StreamableHttpService` |

pub mod chunk;
pub mod config;
pub mod db;
pub mod documents;
pub mod embedding;
pub mod errors;
pub mod fetch;
pub mod ingest;
pub mod libraries;
pub mod mcp;
pub mod migrate;
pub mod models;
pub mod query;
pub mod resolve;
pub mod server;
pub mod store;

pub struct AppState {
    pub store: std::sync::Arc<dyn store::Store>,
    pub embedder: std::sync::Arc<dyn embedding::Embedder>,
    pub config: std::sync::Arc<config::Config>,
    pub http_client: reqwest::Client,
}
