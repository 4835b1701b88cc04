//! End-to-end REST + MCP scenarios, run against the real router with a
//! `MemoryStore` and `HashEmbedder` standing in for SQLite and a remote
//! embedding API.
//!
//! The router is built once per test and `.clone()`-d per request, exactly
//! as `axum::serve` would reuse it across the process lifetime — rebuilding
//! it per request would also hand the MCP session table a fresh,
//! session-less copy on every call.

use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use libdocs::config::Config;
use libdocs::embedding::HashEmbedder;
use libdocs::store::MemoryStore;
use libdocs::{server, store, AppState};

fn test_state() -> Arc<AppState> {
    let config = Arc::new(Config {
        store_path: std::path::PathBuf::from("./data"),
        embedder_model: "hash".to_string(),
        embedding_dim: 32,
        upstream_context7_url: None,
        http_port: 8000,
        fetch_timeout: std::time::Duration::from_secs(5),
        max_content_bytes: 1_000_000,
        ingestion_concurrency: 2,
    });
    let store: Arc<dyn store::Store> = Arc::new(MemoryStore::new());
    let embedder = Arc::new(HashEmbedder::new(32));
    let http_client = reqwest::Client::new();
    Arc::new(AppState { store, embedder, config, http_client })
}

/// Parses a response body as JSON whether it arrived as a plain JSON
/// document or as an SSE-framed `event: message\ndata: <json>\n\n` message —
/// the MCP Streamable HTTP transport may choose either when a request's
/// `Accept` header permits both.
fn parse_json_or_sse(content_type: Option<&str>, bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    let text = std::str::from_utf8(bytes).unwrap();
    if content_type.is_some_and(|ct| ct.contains("text/event-stream")) {
        let data_line = text.lines().find_map(|line| line.strip_prefix("data: ")).expect("SSE body missing a data: line");
        serde_json::from_str(data_line).unwrap()
    } else {
        serde_json::from_str(text).unwrap()
    }
}

async fn post_json(app: &axum::Router, uri: &str, body: Value) -> (axum::http::StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .header("accept", "application/json, text/event-stream")
                .body(axum::body::Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let content_type = response.headers().get("content-type").and_then(|v| v.to_str().ok()).map(str::to_string);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json_body = parse_json_or_sse(content_type.as_deref(), &bytes);
    (status, json_body)
}

async fn patch_json(app: &axum::Router, uri: &str, body: Value) -> (axum::http::StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            axum::http::Request::builder()
                .method("PATCH")
                .uri(uri)
                .header("content-type", "application/json")
                .body(axum::body::Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json_body: Value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, json_body)
}

async fn get_json(app: &axum::Router, uri: &str) -> (axum::http::StatusCode, Value) {
    let response = app.clone().oneshot(axum::http::Request::builder().method("GET").uri(uri).body(axum::body::Body::empty()).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json_body: Value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, json_body)
}

async fn delete_req(app: &axum::Router, uri: &str) -> axum::http::StatusCode {
    let response = app.clone().oneshot(axum::http::Request::builder().method("DELETE").uri(uri).body(axum::body::Body::empty()).unwrap()).await.unwrap();
    response.status()
}

/// Scenario 1 — create & query React (spec §8).
#[tokio::test]
async fn scenario_1_create_and_query_react() {
    let state = test_state();
    let app = server::build_router(state.clone());

    let (status, library) = post_json(&app, "/api/v1/libraries", json!({ "name": "React", "language": "JavaScript", "ecosystem": "npm" })).await;
    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(library["context7_id"], "/npm/react");
    let library_id = library["id"].as_str().unwrap().to_string();

    let (status, doc) = post_json(
        &app,
        "/api/v1/documents",
        json!({
            "library_id": library_id,
            "title": "Hooks",
            "content": "### useState\nAdds state to a component.\n\n### useEffect\nRuns effects after render.\n",
        }),
    )
    .await;
    assert_eq!(status, axum::http::StatusCode::OK);
    assert!(doc["chunk_count"].as_u64().unwrap() >= 2);

    let (status, rpc) = post_json(
        &app,
        "/mcp",
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": { "name": "integration-test", "version": "0.0.0" },
            },
        }),
    )
    .await;
    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(rpc["result"]["protocolVersion"], "2024-11-05");
}

/// Scenario 2 — duplicate library rejection.
#[tokio::test]
async fn scenario_2_duplicate_library_rejected() {
    let state = test_state();
    let app = server::build_router(state.clone());

    post_json(&app, "/api/v1/libraries", json!({ "name": "React", "language": "JavaScript", "ecosystem": "npm" })).await;

    let (status, body) = post_json(&app, "/api/v1/libraries", json!({ "name": "React", "language": "JavaScript", "ecosystem": "npm" })).await;
    assert_eq!(status, axum::http::StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "library.duplicate_name");
}

/// Scenario 3 — content replacement preserves created_at and collapses to
/// a single chunk.
#[tokio::test]
async fn scenario_3_replacement_preserves_created_at() {
    let state = test_state();
    let app = server::build_router(state.clone());

    let (_, library) = post_json(&app, "/api/v1/libraries", json!({ "name": "React", "language": "JavaScript", "ecosystem": "npm" })).await;
    let library_id = library["id"].as_str().unwrap().to_string();

    let (_, doc) = post_json(&app, "/api/v1/documents", json!({ "library_id": library_id, "title": "Hooks", "content": "### useState\nv1 content\n" })).await;
    let document_id = doc["document_id"].as_str().unwrap().to_string();

    let (_, before) = get_json(&app, &format!("/api/v1/documents/{document_id}")).await;
    let created_before = before["created_at"].as_str().unwrap().to_string();

    let (status, replaced) =
        patch_json(&app, &format!("/api/v1/documents/{document_id}/content"), json!({ "content": "### useState\nv2 content\n" })).await;
    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(replaced["chunk_count"], 1);

    let (_, after) = get_json(&app, &format!("/api/v1/documents/{document_id}")).await;
    assert_eq!(after["created_at"], created_before);
}

/// Scenario 4 — library deletion blocked while documents exist.
#[tokio::test]
async fn scenario_4_library_deletion_blocked_until_empty() {
    let state = test_state();
    let app = server::build_router(state.clone());

    let (_, library) = post_json(&app, "/api/v1/libraries", json!({ "name": "React", "language": "JavaScript", "ecosystem": "npm" })).await;
    let library_id = library["id"].as_str().unwrap().to_string();

    let (_, doc) = post_json(&app, "/api/v1/documents", json!({ "library_id": library_id, "title": "Hooks", "content": "### A\nsome content\n" })).await;
    let document_id = doc["document_id"].as_str().unwrap().to_string();

    let status = delete_req(&app, &format!("/api/v1/libraries/{library_id}")).await;
    assert_eq!(status, axum::http::StatusCode::CONFLICT);

    let status = delete_req(&app, &format!("/api/v1/documents/{document_id}")).await;
    assert_eq!(status, axum::http::StatusCode::NO_CONTENT);

    let status = delete_req(&app, &format!("/api/v1/libraries/{library_id}")).await;
    assert_eq!(status, axum::http::StatusCode::NO_CONTENT);
}

/// Scenario 5 — MCP session handshake: `initialize` returns a session id
/// that a follow-up `tools/list` on the same session can reuse, while a
/// request carrying an unknown session id is rejected.
#[tokio::test]
async fn scenario_5_mcp_session_handshake() {
    let state = test_state();
    let app = server::build_router(state.clone());

    let response = app
        .clone()
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/mcp")
                .header("content-type", "application/json")
                .header("accept", "application/json, text/event-stream")
                .body(axum::body::Body::from(
                    json!({
                        "jsonrpc": "2.0",
                        "id": 1,
                        "method": "initialize",
                        "params": {
                            "protocolVersion": "2024-11-05",
                            "capabilities": {},
                            "clientInfo": { "name": "integration-test", "version": "0.0.0" },
                        },
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::OK);
    let session_id = response.headers().get("Mcp-Session-Id").unwrap().to_str().unwrap().to_string();
    assert!(!session_id.is_empty());

    let response2 = app
        .clone()
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/mcp")
                .header("content-type", "application/json")
                .header("accept", "application/json, text/event-stream")
                .header("Mcp-Session-Id", &session_id)
                .body(axum::body::Body::from(json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response2.status(), axum::http::StatusCode::OK);
    let content_type2 = response2.headers().get("content-type").and_then(|v| v.to_str().ok()).map(str::to_string);
    let bytes2 = response2.into_body().collect().await.unwrap().to_bytes();
    let rpc2 = parse_json_or_sse(content_type2.as_deref(), &bytes2);
    let tool_names: Vec<&str> = rpc2["result"]["tools"].as_array().unwrap().iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert!(tool_names.contains(&"resolve-library-id"));
    assert!(tool_names.contains(&"query-docs"));
    assert!(tool_names.contains(&"fetch-library-docs"));

    let response3 = app
        .clone()
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/mcp")
                .header("content-type", "application/json")
                .header("accept", "application/json, text/event-stream")
                .header("Mcp-Session-Id", "unknown-session")
                .body(axum::body::Body::from(json!({ "jsonrpc": "2.0", "id": 3, "method": "tools/list" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response3.status().is_client_error());
}

/// Scenario 6 — disambiguation between two similarly-named libraries. The
/// query "solidstart" has no hyphen and "solid-start" has no alias, so this
/// exercises the hyphen/space-insensitive substring match path directly.
#[tokio::test]
async fn scenario_6_disambiguation() {
    let state = test_state();
    let app = server::build_router(state.clone());

    post_json(&app, "/api/v1/libraries", json!({ "name": "start", "language": "javascript", "ecosystem": "npm" })).await;
    post_json(
        &app,
        "/api/v1/libraries",
        json!({ "name": "solid-start", "language": "javascript", "ecosystem": "websites/solidjs_solid-start" }),
    )
    .await;

    let outcome = libdocs::resolve::resolve_library_id(state.store.as_ref(), state.embedder.as_ref(), "solidstart", "How to throw a redirect in SolidStart")
        .await
        .unwrap();
    assert_eq!(outcome.selected.ecosystem, "websites/solidjs_solid-start");
}
