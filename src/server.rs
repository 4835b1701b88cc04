//! REST API (spec §4.F.1).
//!
//! Exposes the library/document/query engine as a conventional JSON API
//! under `/api/v1/`, plus `/health` and the MCP endpoint mounted by
//! [`crate::mcp`]. All origins/methods/headers are permitted so browser
//! and cross-origin MCP tool clients can reach it directly.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::documents;
use crate::errors::AppError;
use crate::libraries::{self, LibraryPatch, NewLibrary};
use crate::models::{Library, LibraryStatus};
use crate::store::LibraryFilter;
use crate::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let rest_router = Router::new()
        .route("/health", get(handle_health))
        .route("/api/v1/libraries", axum::routing::post(handle_create_library).get(handle_list_libraries))
        .route(
            "/api/v1/libraries/{id}",
            get(handle_get_library).patch(handle_patch_library).put(handle_put_library).delete(handle_delete_library),
        )
        .route("/api/v1/documents", axum::routing::post(handle_create_document).get(handle_list_documents))
        .route("/api/v1/documents/fetch", axum::routing::post(handle_fetch_document))
        .route("/api/v1/documents/{id}", get(handle_get_document).delete(handle_delete_document))
        .route("/api/v1/documents/{id}/content", get(handle_get_document_content).patch(handle_replace_document_content))
        .with_state(state.clone());

    rest_router.merge(crate::mcp::router(state)).layer(cors)
}

pub async fn serve(state: Arc<AppState>) -> anyhow::Result<()> {
    let port = state.config.http_port;
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "libdocs REST/MCP server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", version: env!("CARGO_PKG_VERSION") })
}

// ============ Library DTOs ============

#[derive(Serialize)]
struct LibraryResponse {
    id: String,
    name: String,
    context7_id: String,
    language: String,
    ecosystem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    short_description: Option<String>,
    aliases: Vec<String>,
    keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    homepage_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    repository_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    license: Option<String>,
    status: &'static str,
    popularity_score: i64,
    created_at: String,
    updated_at: String,
    document_count: i64,
}

impl LibraryResponse {
    fn from(library: Library, document_count: i64) -> Self {
        Self {
            id: library.id,
            name: library.name,
            context7_id: library.context7_id,
            language: library.language,
            ecosystem: library.ecosystem,
            description: library.description,
            short_description: library.short_description,
            aliases: library.aliases,
            keywords: library.keywords,
            category: library.category,
            homepage_url: library.homepage_url,
            repository_url: library.repository_url,
            author: library.author,
            license: library.license,
            status: library.status.as_str(),
            popularity_score: library.popularity_score,
            created_at: library.created_at.to_rfc3339(),
            updated_at: library.updated_at.to_rfc3339(),
            document_count,
        }
    }
}

#[derive(Deserialize, Default)]
struct LibraryRequest {
    name: String,
    language: String,
    ecosystem: String,
    description: Option<String>,
    short_description: Option<String>,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    keywords: Vec<String>,
    category: Option<String>,
    homepage_url: Option<String>,
    repository_url: Option<String>,
    author: Option<String>,
    license: Option<String>,
    popularity_score: Option<i64>,
}

impl From<LibraryRequest> for NewLibrary {
    fn from(req: LibraryRequest) -> Self {
        NewLibrary {
            name: req.name,
            language: req.language,
            ecosystem: req.ecosystem,
            description: req.description,
            short_description: req.short_description,
            aliases: req.aliases,
            keywords: req.keywords,
            category: req.category,
            homepage_url: req.homepage_url,
            repository_url: req.repository_url,
            author: req.author,
            license: req.license,
            popularity_score: req.popularity_score,
        }
    }
}

#[derive(Deserialize, Default)]
struct LibraryPatchRequest {
    description: Option<String>,
    short_description: Option<String>,
    aliases: Option<Vec<String>>,
    keywords: Option<Vec<String>>,
    category: Option<String>,
    homepage_url: Option<String>,
    repository_url: Option<String>,
    author: Option<String>,
    license: Option<String>,
    status: Option<String>,
    popularity_score: Option<i64>,
}

async fn handle_create_library(State(state): State<Arc<AppState>>, Json(req): Json<LibraryRequest>) -> Result<Json<LibraryResponse>, AppError> {
    let library = libraries::create_library(state.store.as_ref(), req.into()).await?;
    Ok(Json(LibraryResponse::from(library, 0)))
}

#[derive(Deserialize, Default)]
struct ListLibrariesQuery {
    ecosystem: Option<String>,
    status: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Serialize)]
struct ListLibrariesResponse {
    libraries: Vec<LibraryResponse>,
}

async fn handle_list_libraries(State(state): State<Arc<AppState>>, Query(query): Query<ListLibrariesQuery>) -> Result<Json<ListLibrariesResponse>, AppError> {
    let filter = LibraryFilter { ecosystem: query.ecosystem, status: query.status.as_deref().and_then(LibraryStatus::parse) };
    let items = libraries::list_libraries(state.store.as_ref(), &filter, query.limit.unwrap_or(50), query.offset.unwrap_or(0)).await?;
    let mut responses = Vec::with_capacity(items.len());
    for library in items {
        let count = libraries::document_count(state.store.as_ref(), &library.id).await?;
        responses.push(LibraryResponse::from(library, count));
    }
    Ok(Json(ListLibrariesResponse { libraries: responses }))
}

async fn handle_get_library(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<LibraryResponse>, AppError> {
    let library = libraries::get_library(state.store.as_ref(), &id).await?;
    let count = libraries::document_count(state.store.as_ref(), &library.id).await?;
    Ok(Json(LibraryResponse::from(library, count)))
}

async fn handle_put_library(State(state): State<Arc<AppState>>, Path(id): Path<String>, Json(req): Json<LibraryRequest>) -> Result<Json<LibraryResponse>, AppError> {
    let library = libraries::replace_library(state.store.as_ref(), &id, req.into()).await?;
    let count = libraries::document_count(state.store.as_ref(), &library.id).await?;
    Ok(Json(LibraryResponse::from(library, count)))
}

async fn handle_patch_library(State(state): State<Arc<AppState>>, Path(id): Path<String>, Json(req): Json<LibraryPatchRequest>) -> Result<Json<LibraryResponse>, AppError> {
    let patch = LibraryPatch {
        description: req.description,
        short_description: req.short_description,
        aliases: req.aliases,
        keywords: req.keywords,
        category: req.category,
        homepage_url: req.homepage_url,
        repository_url: req.repository_url,
        author: req.author,
        license: req.license,
        status: req.status.as_deref().and_then(LibraryStatus::parse),
        popularity_score: req.popularity_score,
    };
    let library = libraries::patch_library(state.store.as_ref(), &id, patch).await?;
    let count = libraries::document_count(state.store.as_ref(), &library.id).await?;
    Ok(Json(LibraryResponse::from(library, count)))
}

async fn handle_delete_library(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<axum::http::StatusCode, AppError> {
    libraries::delete_library(state.store.as_ref(), &id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

// ============ Document DTOs ============

#[derive(Serialize)]
struct DocumentResponse {
    document_id: String,
    chunk_count: usize,
}

#[derive(Deserialize)]
struct CreateDocumentRequest {
    library_id: String,
    title: String,
    content: String,
}

async fn handle_create_document(State(state): State<Arc<AppState>>, Json(req): Json<CreateDocumentRequest>) -> Result<Json<DocumentResponse>, AppError> {
    let outcome = documents::create_from_content(state.store.as_ref(), state.embedder.as_ref(), &state.config, &req.library_id, &req.title, &req.content).await?;
    Ok(Json(DocumentResponse { document_id: outcome.document_id, chunk_count: outcome.chunk_count }))
}

#[derive(Deserialize)]
struct FetchDocumentRequest {
    library_id: String,
    title: String,
    url: String,
}

async fn handle_fetch_document(State(state): State<Arc<AppState>>, Json(req): Json<FetchDocumentRequest>) -> Result<Json<DocumentResponse>, AppError> {
    let outcome =
        documents::create_from_url(state.store.as_ref(), state.embedder.as_ref(), &state.config, &state.http_client, &req.library_id, &req.title, &req.url).await?;
    Ok(Json(DocumentResponse { document_id: outcome.document_id, chunk_count: outcome.chunk_count }))
}

#[derive(Deserialize, Default)]
struct ListDocumentsQuery {
    library_id: Option<String>,
}

#[derive(Serialize)]
struct DocumentSummaryResponse {
    document_id: String,
    library_id: String,
    title: String,
    chunk_total: i64,
    source: String,
    source_type: String,
    created_at: String,
}

async fn handle_list_documents(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListDocumentsQuery>,
) -> Result<Json<Vec<DocumentSummaryResponse>>, AppError> {
    let summaries = documents::list_documents(state.store.as_ref(), query.library_id.as_deref()).await?;
    Ok(Json(
        summaries
            .into_iter()
            .map(|s| DocumentSummaryResponse {
                document_id: s.document_id,
                library_id: s.library_id,
                title: s.title,
                chunk_total: s.chunk_total,
                source: s.source,
                source_type: s.source_type,
                created_at: s.created_at.to_rfc3339(),
            })
            .collect(),
    ))
}

async fn handle_get_document(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<DocumentSummaryResponse>, AppError> {
    let s = documents::get_document_metadata(state.store.as_ref(), &id).await?;
    Ok(Json(DocumentSummaryResponse {
        document_id: s.document_id,
        library_id: s.library_id,
        title: s.title,
        chunk_total: s.chunk_total,
        source: s.source,
        source_type: s.source_type,
        created_at: s.created_at.to_rfc3339(),
    }))
}

async fn handle_get_document_content(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<String, AppError> {
    documents::get_document_content(state.store.as_ref(), &id).await
}

#[derive(Deserialize)]
struct ReplaceContentRequest {
    content: String,
}

async fn handle_replace_document_content(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ReplaceContentRequest>,
) -> Result<Json<DocumentResponse>, AppError> {
    let outcome = documents::replace_content(state.store.as_ref(), state.embedder.as_ref(), &state.config, &id, &req.content).await?;
    Ok(Json(DocumentResponse { document_id: outcome.document_id, chunk_count: outcome.chunk_count }))
}

async fn handle_delete_document(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<axum::http::StatusCode, AppError> {
    documents::delete_document(state.store.as_ref(), &id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
