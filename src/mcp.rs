//! MCP Streamable HTTP transport (spec §4.F.2), built on `rmcp` — the same
//! crate and transport the upstream tool registry used for its MCP surface.
//! `StreamableHttpService` is a `tower::Service`, so it nests into the REST
//! router's `Router` via `nest_service` under one `axum::serve` rather than
//! running as a separate process.

use std::borrow::Cow;
use std::sync::Arc;

use axum::Router;
use rmcp::model::*;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::StreamableHttpService;
use rmcp::{ErrorData as McpError, ServerHandler};

use crate::errors::{AppError, ErrorKind};
use crate::query::{self, QueryOptions};
use crate::resolve;
use crate::AppState;

/// Bridges the resolve/query/fetch operations to the MCP protocol. Every
/// session receives a clone of this struct (state is `Arc`-wrapped), so all
/// sessions share the same store and embedder.
#[derive(Clone)]
pub struct McpBridge {
    app: Arc<AppState>,
}

impl McpBridge {
    pub fn new(app: Arc<AppState>) -> Self {
        Self { app }
    }

    fn make_tool(name: &'static str, description: &'static str, schema: serde_json::Value) -> Tool {
        let input_schema = match schema {
            serde_json::Value::Object(map) => Arc::new(map),
            _ => Arc::new(serde_json::Map::new()),
        };
        Tool {
            name: Cow::Borrowed(name),
            title: None,
            description: Some(Cow::Borrowed(description)),
            input_schema,
            output_schema: None,
            annotations: Some(ToolAnnotations::new().read_only(true)),
            execution: None,
            icons: None,
            meta: None,
        }
    }

    fn tools() -> Vec<Tool> {
        vec![
            Self::make_tool(
                "resolve-library-id",
                "Resolve a free-form library name to its canonical identifier",
                serde_json::json!({
                    "type": "object",
                    "properties": { "libraryName": { "type": "string" }, "query": { "type": "string" } },
                    "required": ["libraryName", "query"],
                }),
            ),
            Self::make_tool(
                "query-docs",
                "Run a semantic search for documentation within a library",
                serde_json::json!({
                    "type": "object",
                    "properties": { "libraryId": { "type": "string" }, "query": { "type": "string" }, "k": { "type": "integer" } },
                    "required": ["libraryId", "query"],
                }),
            ),
            Self::make_tool(
                "fetch-library-docs",
                "Resolve a library locally, optionally fetching it from the upstream mirror if missing",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "libraryName": { "type": "string" },
                        "query": { "type": "string" },
                        "fetchIfMissing": { "type": "boolean" },
                    },
                    "required": ["libraryName", "query"],
                }),
            ),
        ]
    }
}

impl ServerHandler for McpBridge {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "libdocs".to_string(),
                title: Some("libdocs".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "libdocs — a self-hosted documentation retrieval service. Use resolve-library-id \
                 to find a library's canonical id, query-docs to search its documentation, and \
                 fetch-library-docs to resolve (optionally fetching from the upstream mirror) a \
                 library that may not yet be stored locally."
                    .to_string(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult::with_all_items(Self::tools())))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        Self::tools().into_iter().find(|t| t.name == name)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let arguments = request.arguments.clone().map(serde_json::Value::Object).unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        match dispatch_tool_call(&self.app, request.name.as_ref(), &arguments).await {
            Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
            Err(e) if e.kind == ErrorKind::Protocol => Err(McpError::new(ErrorCode::METHOD_NOT_FOUND, e.public_message(), None)),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.public_message())])),
        }
    }
}

/// Builds the `/mcp` Streamable HTTP endpoint, pre-bound to `app` so it
/// nests into the main router regardless of that router's own state type.
/// `LocalSessionManager` owns `Mcp-Session-Id` issuance, idle expiry, and
/// SSE-vs-JSON response framing per the transport's content negotiation.
pub fn router(app: Arc<AppState>) -> Router {
    let service = StreamableHttpService::new(move || Ok(McpBridge::new(app.clone())), LocalSessionManager::default().into(), Default::default());
    Router::new().nest_service("/mcp", service)
}

async fn dispatch_tool_call(app: &AppState, name: &str, arguments: &serde_json::Value) -> Result<String, AppError> {
    match name {
        "resolve-library-id" => {
            let library_name = require_str(arguments, "libraryName")?;
            let query_text = require_str(arguments, "query")?;
            let outcome = resolve::resolve_library_id(app.store.as_ref(), app.embedder.as_ref(), library_name, query_text).await?;
            Ok(format!(
                "Selected: {} ({}) — score {:.3}\nAlternatives: {}",
                outcome.selected.name,
                outcome.selected.context7_id,
                outcome.score,
                if outcome.alternatives.is_empty() {
                    "none".to_string()
                } else {
                    outcome.alternatives.iter().map(|l| l.context7_id.clone()).collect::<Vec<_>>().join(", ")
                }
            ))
        }
        "query-docs" => {
            let library_id = require_str(arguments, "libraryId")?;
            let query_text = require_str(arguments, "query")?;
            let k = arguments.get("k").and_then(|v| v.as_i64());
            let result = query::query_docs(app.store.as_ref(), app.embedder.as_ref(), library_id, query_text, QueryOptions { k, source_type: None }).await?;
            Ok(result.rendered)
        }
        "fetch-library-docs" => {
            let library_name = require_str(arguments, "libraryName")?;
            let query_text = require_str(arguments, "query")?;
            let fetch_if_missing = arguments.get("fetchIfMissing").and_then(|v| v.as_bool()).unwrap_or(false);
            let outcome = resolve::resolve_or_fetch(
                app.store.as_ref(),
                app.embedder.as_ref(),
                &app.config,
                &app.http_client,
                library_name,
                query_text,
                fetch_if_missing,
            )
            .await?;
            Ok(format!("Resolved: {} ({})", outcome.selected.name, outcome.selected.context7_id))
        }
        other => Err(AppError::protocol("mcp.method_not_found", format!("unknown tool '{other}'"))),
    }
}

fn require_str<'a>(value: &'a serde_json::Value, key: &str) -> Result<&'a str, AppError> {
    value.get(key).and_then(|v| v.as_str()).ok_or_else(|| AppError::validation("mcp.invalid_params", format!("missing required parameter '{key}'")))
}
